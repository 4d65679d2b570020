//! BLE scanning on top of btleplug.
//!
//! Provides the platform [`ScanFacility`] used by sessions created with
//! [`DiscoverySession::with_bluetooth`](crate::DiscoverySession::with_bluetooth).

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::ble::facility::{AdvertisementEvent, ScanFacility, ScanFailure, ScanSink};
use crate::config::ScanSettings;
use crate::error::{Error, Result};

/// Address CoreBluetooth reports when it hides the real hardware address.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Scan facility backed by a btleplug adapter.
pub struct BtleplugScanFacility {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Handle to the task forwarding adapter events into the sink.
    scan_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugScanFacility {
    /// Create a facility on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a facility on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            scan_handle: Mutex::new(None),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn spawn_event_loop(&self, mut events: CentralEvents, sink: ScanSink) -> JoinHandle<()> {
        let adapter = self.adapter.clone();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if sink.is_closed() {
                    break;
                }
                Self::handle_event(event, &adapter, &sink).await;
            }

            if !sink.is_closed() {
                error!("Adapter event stream ended while scanning");
                sink.on_scan_failed(ScanFailure::InternalError);
            }

            debug!("Scan event loop ended");
        })
    }

    /// Handle a BLE central event.
    async fn handle_event(event: CentralEvent, adapter: &Adapter, sink: &ScanSink) {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                trace!("Device discovered: {:?}", id);
                Self::process_peripheral(adapter, id, sink).await;
            }
            CentralEvent::DeviceUpdated(id) => {
                trace!("Device updated: {:?}", id);
                Self::process_peripheral(adapter, id, sink).await;
            }
            CentralEvent::ManufacturerDataAdvertisement { id, .. } => {
                Self::process_peripheral(adapter, id, sink).await;
            }
            CentralEvent::ServiceDataAdvertisement { id, .. } => {
                Self::process_peripheral(adapter, id, sink).await;
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
            }
            CentralEvent::ServicesAdvertisement { .. } => {}
            CentralEvent::StateUpdate(state) => {
                debug!("Adapter state: {:?}", state);
            }
        }
    }

    /// Turn a peripheral's current properties into an advertisement event.
    async fn process_peripheral(adapter: &Adapter, id: PeripheralId, sink: &ScanSink) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let address = properties.address.to_string();
        let device_identifier = if address == HIDDEN_ADDRESS {
            id.to_string()
        } else {
            address
        };

        let raw_payload = AdvertisementEvent::encode_payload(
            &properties.manufacturer_data,
            &properties.service_data,
        );

        let event = AdvertisementEvent {
            device_identifier,
            device_name: properties.local_name,
            raw_payload,
        };

        sink.on_scan_result(event);
    }
}

#[async_trait]
impl ScanFacility for BtleplugScanFacility {
    async fn start_scan(&self, settings: &ScanSettings, sink: ScanSink) -> Result<()> {
        info!("Starting platform BLE scan");

        // Subscribe before scanning so early discoveries are not missed.
        let events = self.adapter.events().await?;

        self.adapter
            .start_scan(ScanFilter {
                services: settings.services.clone(),
            })
            .await?;

        let handle = self.spawn_event_loop(events, sink);
        if let Some(previous) = self.scan_handle.lock().replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        info!("Stopping platform BLE scan");

        if let Some(handle) = self.scan_handle.lock().take() {
            handle.abort();
        }

        self.adapter.stop_scan().await?;
        Ok(())
    }
}

impl Drop for BtleplugScanFacility {
    fn drop(&mut self) {
        if let Some(handle) = self.scan_handle.get_mut().take() {
            handle.abort();
        }
    }
}
