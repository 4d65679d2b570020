//! Utility functions for the ble-device-scanner crate.

use crate::error::{Error, Result};

/// Label shown for a device that advertised no name and has no alias.
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Check whether a string is a hardware address of six colon-separated hex byte pairs.
///
/// # Example
///
/// ```
/// use ble_device_scanner::utils::is_hardware_address;
///
/// assert!(is_hardware_address("FA:62:81:77:7F:13"));
/// assert!(!is_hardware_address("FA-62-81-77-7F-13"));
/// ```
pub fn is_hardware_address(value: &str) -> bool {
    let mut parts = 0;
    for part in value.split(':') {
        parts += 1;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
    }
    parts == 6
}

/// Normalise a hardware address to upper case.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if `value` is not a hardware address.
///
/// # Example
///
/// ```
/// use ble_device_scanner::utils::normalize_address;
///
/// assert_eq!(normalize_address("fa:62:81:77:7f:13").unwrap(), "FA:62:81:77:7F:13");
/// ```
pub fn normalize_address(value: &str) -> Result<String> {
    if !is_hardware_address(value) {
        return Err(Error::InvalidAddress {
            value: value.to_string(),
        });
    }
    Ok(value.to_ascii_uppercase())
}

/// Format one device list row: `"<label> - <identifier>"`.
///
/// An absent label renders as [`UNKNOWN_DEVICE`].
///
/// # Example
///
/// ```
/// use ble_device_scanner::utils::format_device_row;
///
/// assert_eq!(
///     format_device_row(None, "00:11:22:33:44:55"),
///     "Unknown Device - 00:11:22:33:44:55"
/// );
/// ```
pub fn format_device_row(label: Option<&str>, identifier: &str) -> String {
    format!("{} - {}", label.unwrap_or(UNKNOWN_DEVICE), identifier)
}

/// Join payload bytes as comma-separated decimals, the way diagnostics print them.
pub fn join_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
