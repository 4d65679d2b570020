//! Bluetooth SIG assigned numbers used when recognising beacons.

use uuid::Uuid;

/// The Bluetooth Base UUID that all 16-bit and 32-bit UUIDs expand into.
const BASE_UUID_VALUE: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

/// Mask selecting the bits of a UUID that are not part of the short form.
const SHORT_UUID_MASK: u128 = 0x0000_0000_ffff_ffff_ffff_ffffffffffff;

/// Apple Inc's Bluetooth company identifier (carries iBeacon frames).
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// 16-bit service UUID assigned to Eddystone.
pub const EDDYSTONE_SERVICE_UUID16: u16 = 0xFEAA;

/// Full 128-bit Eddystone service UUID.
pub const EDDYSTONE_SERVICE_UUID: Uuid = uuid_from_u16(EDDYSTONE_SERVICE_UUID16);

/// Advertising data types from the Generic Access Profile assigned numbers.
pub mod ad_type {
    /// Flags.
    pub const FLAGS: u8 = 0x01;
    /// Complete list of 16-bit service class UUIDs.
    pub const COMPLETE_SERVICE_UUIDS_16: u8 = 0x03;
    /// Shortened local name.
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    /// Complete local name.
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    /// Service data with a 16-bit UUID.
    pub const SERVICE_DATA_16: u8 = 0x16;
    /// Service data with a 128-bit UUID.
    pub const SERVICE_DATA_128: u8 = 0x21;
    /// Manufacturer specific data.
    pub const MANUFACTURER_SPECIFIC: u8 = 0xFF;

    /// Human-readable name of an AD type, if it is one of the above.
    pub fn name(kind: u8) -> Option<&'static str> {
        match kind {
            FLAGS => Some("Flags"),
            COMPLETE_SERVICE_UUIDS_16 => Some("16-bit Service UUIDs"),
            SHORTENED_LOCAL_NAME => Some("Shortened Local Name"),
            COMPLETE_LOCAL_NAME => Some("Complete Local Name"),
            SERVICE_DATA_16 => Some("Service Data"),
            SERVICE_DATA_128 => Some("Service Data (128-bit)"),
            MANUFACTURER_SPECIFIC => Some("Manufacturer Data"),
            _ => None,
        }
    }
}

/// Expand a 16-bit assigned number into a full UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID_VALUE | ((short as u128) << 96))
}

/// Get the 16-bit short form of a UUID, if it is derived from the base UUID.
pub fn short_uuid16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & SHORT_UUID_MASK != BASE_UUID_VALUE {
        return None;
    }
    let short = value >> 96;
    u16::try_from(short).ok()
}
