//! Session configuration.
//!
//! Holds the scan settings passed to the scan facility and the table of
//! named beacon aliases used when a device advertises no name.

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::utils::normalize_address;

/// Built-in beacon aliases, keyed by hardware address.
pub const DEFAULT_ALIASES: [(&str, &str); 3] = [
    ("FA:62:81:77:7F:13", "Abdullah Mohamed"),
    ("FF:69:56:1B:B3:5B", "ALJ30214700276"),
    ("F9:61:80:76:7E:12", "EddyStone"),
];

/// Settings for a platform scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanSettings {
    /// Only report devices advertising one of these services. Empty means no filter.
    pub services: Vec<Uuid>,
    /// Log recognised beacon structures of newly registered devices.
    pub log_beacons: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            log_beacons: true,
        }
    }
}

impl ScanSettings {
    /// Restrict the scan to devices advertising `service`.
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    /// Enable or disable beacon diagnostics.
    pub fn with_beacon_logging(mut self, enabled: bool) -> Self {
        self.log_beacons = enabled;
        self
    }
}

/// Human-friendly labels for known hardware addresses.
///
/// Lookups are case-insensitive on the address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(address, label)| (address.to_string(), label.to_string()))
            .collect();
        Self { aliases }
    }
}

impl AliasTable {
    /// Create a table with no aliases.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Add or replace the alias for `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is not a hardware address.
    pub fn insert(&mut self, address: &str, label: impl Into<String>) -> Result<()> {
        let address = normalize_address(address)?;
        self.aliases.insert(address, label.into());
        Ok(())
    }

    /// Look up the alias for `address`.
    pub fn lookup(&self, address: &str) -> Option<&str> {
        self.aliases
            .get(&address.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Check if the table has no aliases.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Configuration for a discovery session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Settings passed to the scan facility on every start.
    pub settings: ScanSettings,
    /// Aliases for devices that advertise no name.
    pub aliases: AliasTable,
}

impl SessionConfig {
    /// Replace the scan settings.
    pub fn with_settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the alias table.
    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }
}
