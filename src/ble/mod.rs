//! BLE scanning module.
//!
//! This module provides the scan facility seam, the btleplug-backed
//! implementation of it, and decoding of the beacon payloads seen during
//! discovery.

pub mod advertising;
pub mod facility;
pub mod scanner;
pub mod uuids;

pub use advertising::{AdStructure, BeaconKind, EddystoneFrame, IBeacon};
pub use facility::{AdvertisementEvent, ScanFacility, ScanFailure, ScanNotification, ScanSink};
pub use scanner::BtleplugScanFacility;
