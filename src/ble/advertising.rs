//! Advertising payload decoding.
//!
//! Splits a raw advertising payload into AD structures and recognises the two
//! beacon formats the scanner reports on: Apple iBeacon (proximity beacon)
//! and Google Eddystone (URL beacon family). Anything else is kept as an
//! opaque [`AdStructure::Other`].

use bytes::Bytes;
use uuid::Uuid;

use crate::ble::uuids::{ad_type, APPLE_COMPANY_ID, EDDYSTONE_SERVICE_UUID16};
use crate::error::{Error, Result};

/// iBeacon type and length prefix following the Apple company id.
const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];

/// Size of an iBeacon body after the company id (prefix + UUID + major + minor + power).
const IBEACON_BODY_LEN: usize = 23;

/// Eddystone-URL scheme prefixes, indexed by the scheme byte.
const URL_SCHEMES: [&str; 4] = ["http://www.", "https://www.", "http://", "https://"];

/// Eddystone-URL expansion codes, indexed by the encoded byte.
const URL_EXPANSIONS: [&str; 14] = [
    ".com/", ".org/", ".edu/", ".net/", ".info/", ".biz/", ".gov/", ".com", ".org", ".edu",
    ".net", ".info", ".biz", ".gov",
];

/// Which beacon family a structure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeaconKind {
    /// Apple iBeacon proximity beacon.
    IBeacon,
    /// Google Eddystone beacon.
    Eddystone,
}

impl BeaconKind {
    /// Short label used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IBeacon => "iBeacon",
            Self::Eddystone => "Eddystone",
        }
    }
}

impl std::fmt::Display for BeaconKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An Apple iBeacon frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBeacon {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
    /// Calibrated signal power at 1 m, in dBm.
    pub tx_power: i8,
}

impl IBeacon {
    /// Parse the manufacturer data body that follows the Apple company id.
    fn from_body(body: &[u8]) -> Option<Self> {
        if body.len() != IBEACON_BODY_LEN || body[..2] != IBEACON_PREFIX {
            return None;
        }

        let uuid = Uuid::from_slice(&body[2..18]).ok()?;
        let major = u16::from_be_bytes([body[18], body[19]]);
        let minor = u16::from_be_bytes([body[20], body[21]]);
        let tx_power = body[22] as i8;

        Some(Self {
            uuid,
            major,
            minor,
            tx_power,
        })
    }
}

impl std::fmt::Display for IBeacon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "iBeacon(uuid={}, major={}, minor={}, power={})",
            self.uuid, self.major, self.minor, self.tx_power
        )
    }
}

/// An Eddystone frame carried in 0xFEAA service data.
#[derive(Debug, Clone, PartialEq)]
pub enum EddystoneFrame {
    /// Eddystone-UID: a static namespace/instance identifier.
    Uid {
        /// Calibrated power at 0 m, in dBm.
        tx_power: i8,
        /// 10-byte namespace.
        namespace: [u8; 10],
        /// 6-byte instance.
        instance: [u8; 6],
    },
    /// Eddystone-URL: a compressed URL.
    Url {
        /// Calibrated power at 0 m, in dBm.
        tx_power: i8,
        /// The expanded URL.
        url: String,
    },
    /// Eddystone-TLM (unencrypted): beacon telemetry.
    Tlm {
        /// Battery voltage in millivolts, 0 if unsupported.
        battery_mv: u16,
        /// Beacon temperature in degrees Celsius, `None` if unsupported.
        temperature: Option<f32>,
        /// Advertising PDUs sent since power-up.
        advertisement_count: u32,
        /// Time since power-up, in 0.1 s units.
        uptime_deciseconds: u32,
    },
    /// Eddystone-EID: a rotating ephemeral identifier.
    Eid {
        /// Calibrated power at 0 m, in dBm.
        tx_power: i8,
        /// 8-byte ephemeral identifier.
        eid: [u8; 8],
    },
}

impl EddystoneFrame {
    const UID: u8 = 0x00;
    const URL: u8 = 0x10;
    const TLM: u8 = 0x20;
    const EID: u8 = 0x30;

    /// Parse the service data body that follows the 0xFEAA UUID.
    fn from_body(body: &[u8]) -> Option<Self> {
        let (&frame_type, rest) = body.split_first()?;

        match frame_type {
            Self::UID => {
                if rest.len() < 17 {
                    return None;
                }
                let mut namespace = [0u8; 10];
                namespace.copy_from_slice(&rest[1..11]);
                let mut instance = [0u8; 6];
                instance.copy_from_slice(&rest[11..17]);
                Some(Self::Uid {
                    tx_power: rest[0] as i8,
                    namespace,
                    instance,
                })
            }
            Self::URL => {
                if rest.len() < 2 {
                    return None;
                }
                let url = decode_url(rest[1], &rest[2..])?;
                Some(Self::Url {
                    tx_power: rest[0] as i8,
                    url,
                })
            }
            Self::TLM => {
                // Only the unencrypted (version 0) layout is readable.
                if rest.len() < 13 || rest[0] != 0 {
                    return None;
                }
                let battery_mv = u16::from_be_bytes([rest[1], rest[2]]);
                let temperature = match i16::from_be_bytes([rest[3], rest[4]]) {
                    i16::MIN => None,
                    raw => Some(raw as f32 / 256.0),
                };
                let advertisement_count =
                    u32::from_be_bytes([rest[5], rest[6], rest[7], rest[8]]);
                let uptime_deciseconds =
                    u32::from_be_bytes([rest[9], rest[10], rest[11], rest[12]]);
                Some(Self::Tlm {
                    battery_mv,
                    temperature,
                    advertisement_count,
                    uptime_deciseconds,
                })
            }
            Self::EID => {
                if rest.len() < 9 {
                    return None;
                }
                let mut eid = [0u8; 8];
                eid.copy_from_slice(&rest[1..9]);
                Some(Self::Eid {
                    tx_power: rest[0] as i8,
                    eid,
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for EddystoneFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uid {
                tx_power,
                namespace,
                instance,
            } => write!(
                f,
                "Eddystone-UID(namespace={}, instance={}, power={})",
                hex(namespace),
                hex(instance),
                tx_power
            ),
            Self::Url { tx_power, url } => {
                write!(f, "Eddystone-URL(url={}, power={})", url, tx_power)
            }
            Self::Tlm {
                battery_mv,
                temperature,
                advertisement_count,
                uptime_deciseconds,
            } => {
                write!(f, "Eddystone-TLM(battery={}mV, ", battery_mv)?;
                match temperature {
                    Some(t) => write!(f, "temperature={:.2}C, ", t)?,
                    None => write!(f, "temperature=n/a, ")?,
                }
                write!(
                    f,
                    "count={}, uptime={:.1}s)",
                    advertisement_count,
                    *uptime_deciseconds as f64 / 10.0
                )
            }
            Self::Eid { tx_power, eid } => {
                write!(f, "Eddystone-EID(eid={}, power={})", hex(eid), tx_power)
            }
        }
    }
}

/// Expand an Eddystone-URL scheme byte and encoded body.
fn decode_url(scheme: u8, encoded: &[u8]) -> Option<String> {
    let mut url = String::from(*URL_SCHEMES.get(scheme as usize)?);

    for &byte in encoded {
        match byte {
            0x00..=0x0d => url.push_str(URL_EXPANSIONS[byte as usize]),
            0x21..=0x7e => url.push(byte as char),
            _ => return None,
        }
    }

    Some(url)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One AD structure from an advertising payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AdStructure {
    /// An iBeacon manufacturer data frame.
    IBeacon(IBeacon),
    /// An Eddystone service data frame.
    Eddystone(EddystoneFrame),
    /// Any structure that is not a recognised beacon.
    Other {
        /// The AD type byte.
        ad_type: u8,
        /// The structure body.
        data: Bytes,
    },
}

impl AdStructure {
    fn classify(kind: u8, body: &[u8]) -> Self {
        let beacon = match kind {
            ad_type::MANUFACTURER_SPECIFIC if body.len() >= 2 => {
                let company_id = u16::from_le_bytes([body[0], body[1]]);
                if company_id == APPLE_COMPANY_ID {
                    IBeacon::from_body(&body[2..]).map(Self::IBeacon)
                } else {
                    None
                }
            }
            ad_type::SERVICE_DATA_16 if body.len() >= 2 => {
                let service = u16::from_le_bytes([body[0], body[1]]);
                if service == EDDYSTONE_SERVICE_UUID16 {
                    EddystoneFrame::from_body(&body[2..]).map(Self::Eddystone)
                } else {
                    None
                }
            }
            _ => None,
        };

        beacon.unwrap_or_else(|| Self::Other {
            ad_type: kind,
            data: Bytes::copy_from_slice(body),
        })
    }

    /// Get the beacon family of this structure, if it is a recognised beacon.
    pub fn beacon_kind(&self) -> Option<BeaconKind> {
        match self {
            Self::IBeacon(_) => Some(BeaconKind::IBeacon),
            Self::Eddystone(_) => Some(BeaconKind::Eddystone),
            Self::Other { .. } => None,
        }
    }
}

impl std::fmt::Display for AdStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IBeacon(beacon) => std::fmt::Display::fmt(beacon, f),
            Self::Eddystone(frame) => std::fmt::Display::fmt(frame, f),
            Self::Other { ad_type: kind, data } => match ad_type::name(*kind) {
                Some(name) => write!(f, "{}({} bytes)", name, data.len()),
                None => write!(f, "AD(type=0x{:02X}, {} bytes)", kind, data.len()),
            },
        }
    }
}

/// Split a raw advertising payload into AD structures.
///
/// A zero length byte ends the significant part of the payload; everything
/// after it is padding.
///
/// # Errors
///
/// Returns [`Error::InvalidData`] if a structure's length runs past the end of
/// the payload.
pub fn parse(data: &[u8]) -> Result<Vec<AdStructure>> {
    let mut structures = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let len = data[offset] as usize;
        if len == 0 {
            break;
        }

        let end = offset + 1 + len;
        if end > data.len() {
            return Err(Error::InvalidData {
                context: format!(
                    "AD structure at offset {} needs {} bytes, only {} left",
                    offset,
                    len,
                    data.len() - offset - 1
                ),
            });
        }

        let kind = data[offset + 1];
        structures.push(AdStructure::classify(kind, &data[offset + 2..end]));
        offset = end;
    }

    Ok(structures)
}

/// Parse a payload and keep only recognised beacon structures.
pub fn beacons(data: &[u8]) -> Result<Vec<AdStructure>> {
    Ok(parse(data)?
        .into_iter()
        .filter(|s| s.beacon_kind().is_some())
        .collect())
}
