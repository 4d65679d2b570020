//! # ble-device-scanner
//!
//! Discover nearby Bluetooth Low Energy devices and keep them in a
//! de-duplicated list ordered by when each device was first seen.
//!
//! A [`DiscoverySession`] drives a platform scan through a [`ScanFacility`]
//! and feeds every advertisement into a [`DeviceRegistry`]. A device is
//! registered once per session; later advertisements from the same address
//! are absorbed. [`DiscoverySession::restart`] empties the registry and
//! begins a fresh scan, which is what a "refresh" button in a UI calls.
//!
//! Devices that advertise no name are labelled from an [`AliasTable`], and
//! fall back to [`UNKNOWN_DEVICE`](utils::UNKNOWN_DEVICE) when rendered.
//! iBeacon and Eddystone payloads of newly found devices are recognised and
//! logged through `tracing`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_device_scanner::{DiscoverySession, Result, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = DiscoverySession::with_bluetooth(SessionConfig::default()).await?;
//!     session.start().await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     for device in session.snapshot() {
//!         println!("{}", device.row());
//!     }
//!
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. CoreBluetooth hides hardware addresses, so
//! devices are identified by their platform peripheral id instead.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration and device records

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod utils;

// Re-exports for convenience
pub use ble::{AdvertisementEvent, BtleplugScanFacility, ScanFacility, ScanFailure, ScanSink};
pub use config::{AliasTable, ScanSettings, SessionConfig};
pub use error::{Error, Result};
pub use registry::{DeviceRecord, DeviceRegistry, RegistryEvent};
pub use session::{DiscoverySession, SessionEvent, SessionState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_build_a_registry() {
        let config = SessionConfig::default();
        assert!(config.settings.log_beacons);

        let registry = DeviceRegistry::new(config.aliases);
        assert!(registry.insert_if_absent(&AdvertisementEvent::new("FA:62:81:77:7F:13", None)));
        assert_eq!(registry.snapshot()[0].row(), "Abdullah Mohamed - FA:62:81:77:7F:13");

        let err = Error::ScanFailed {
            failure: ScanFailure::from_code(2),
        };
        assert!(matches!(err, Error::ScanFailed { .. }));
    }
}
