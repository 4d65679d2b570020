//! De-duplicated, discovery-ordered device registry.
//!
//! The registry is shared between the scan pump (writer) and any number of
//! readers. All access goes through a single lock so an insert can never be
//! split by a concurrent [`DeviceRegistry::clear`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::ble::facility::AdvertisementEvent;
use crate::config::AliasTable;
use crate::utils::{format_device_row, UNKNOWN_DEVICE};

/// Capacity of the registry change channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A discovered device. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// Hardware address, unique within a registry.
    pub identifier: String,
    /// Advertised name, or the configured alias when no name was advertised.
    pub display_name: Option<String>,
    /// When the device was first seen.
    pub discovered_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Name to show for this device, falling back to [`UNKNOWN_DEVICE`].
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(UNKNOWN_DEVICE)
    }

    /// The list row for this device: `"<label> - <identifier>"`.
    pub fn row(&self) -> String {
        format_device_row(self.display_name.as_deref(), &self.identifier)
    }
}

/// Change notification emitted by a [`DeviceRegistry`].
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A new device was appended.
    Inserted(DeviceRecord),
    /// The registry was emptied.
    Cleared,
}

#[derive(Default)]
struct RegistryInner {
    records: Vec<DeviceRecord>,
    seen: HashSet<String>,
}

/// Ordered set of discovered devices keyed by identifier.
pub struct DeviceRegistry {
    /// Aliases consulted when a device advertises no name.
    aliases: AliasTable,
    /// Records plus an index for O(1) duplicate checks.
    inner: Mutex<RegistryInner>,
    /// Change notifications.
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(AliasTable::default())
    }
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new(aliases: AliasTable) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            aliases,
            inner: Mutex::new(RegistryInner::default()),
            event_tx,
        }
    }

    /// Register the device behind `event` unless its identifier is already known.
    ///
    /// An advertised name that is empty is treated like no name at all, so the
    /// alias table (and later "Unknown Device") applies to it.
    ///
    /// Returns `true` if a record was appended, `false` for a duplicate.
    pub fn insert_if_absent(&self, event: &AdvertisementEvent) -> bool {
        let mut inner = self.inner.lock();

        if inner.seen.contains(&event.device_identifier) {
            trace!("Duplicate advertisement from {}", event.device_identifier);
            return false;
        }

        let display_name = event
            .device_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.aliases.lookup(&event.device_identifier))
            .map(str::to_string);

        let record = DeviceRecord {
            identifier: event.device_identifier.clone(),
            display_name,
            discovered_at: Utc::now(),
        };

        debug!("Registered device: {}", record.row());

        inner.seen.insert(record.identifier.clone());
        inner.records.push(record.clone());

        // Sent under the lock so subscribers observe inserts in registry order.
        let _ = self.event_tx.send(RegistryEvent::Inserted(record));

        true
    }

    /// Remove every record.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let removed = inner.records.len();
        inner.records.clear();
        inner.seen.clear();

        debug!("Cleared {} devices", removed);
        let _ = self.event_tx.send(RegistryEvent::Cleared);
    }

    /// Get a copy of the records in discovery order.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.inner.lock().records.clone()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Check if no devices are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Check if a device with `identifier` is registered.
    pub fn contains(&self, identifier: &str) -> bool {
        self.inner.lock().seen.contains(identifier)
    }

    /// Subscribe to registry changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }
}
