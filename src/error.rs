//! Error types for the ble-device-scanner crate.

use thiserror::Error;

use crate::ble::facility::ScanFailure;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The scan facility refused or aborted a scan.
    #[error("Scan failed: {failure}")]
    ScanFailed {
        /// The failure reported by the scan facility.
        failure: ScanFailure,
    },

    /// Invalid advertisement data was received.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// A string could not be read as a hardware address.
    #[error("Invalid hardware address: {value}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
