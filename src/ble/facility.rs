//! The seam between a discovery session and the platform's BLE scanner.
//!
//! A [`ScanFacility`] starts and stops platform scans. While a scan is active
//! it pushes [`ScanNotification`]s into the [`ScanSink`] it was handed, from
//! whatever thread or task the platform delivers callbacks on.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ble::uuids::{ad_type, short_uuid16};
use crate::config::ScanSettings;
use crate::error::Result;

/// A single advertisement received during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementEvent {
    /// Hardware address of the advertiser (`AA:BB:CC:DD:EE:FF`).
    pub device_identifier: String,
    /// Advertised local name, if any.
    pub device_name: Option<String>,
    /// Raw advertising payload. Only used for diagnostics.
    pub raw_payload: Bytes,
}

impl AdvertisementEvent {
    /// Create an event with an empty payload.
    pub fn new(device_identifier: impl Into<String>, device_name: Option<String>) -> Self {
        Self {
            device_identifier: device_identifier.into(),
            device_name,
            raw_payload: Bytes::new(),
        }
    }

    /// Attach a raw advertising payload.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.raw_payload = payload.into();
        self
    }

    /// Rebuild a raw advertising payload from data a platform has already split
    /// into manufacturer and service data maps.
    ///
    /// Entries are emitted in ascending key order. Entries too large to fit a
    /// single AD structure are dropped.
    pub fn encode_payload(
        manufacturer_data: &HashMap<u16, Vec<u8>>,
        service_data: &HashMap<Uuid, Vec<u8>>,
    ) -> Bytes {
        let mut buf = BytesMut::new();

        let mut companies: Vec<_> = manufacturer_data.iter().collect();
        companies.sort_by_key(|(id, _)| **id);
        for (company_id, data) in companies {
            let Some(len) = structure_len(2 + data.len()) else {
                continue;
            };
            buf.put_u8(len);
            buf.put_u8(ad_type::MANUFACTURER_SPECIFIC);
            buf.put_u16_le(*company_id);
            buf.put_slice(data);
        }

        let mut services: Vec<_> = service_data.iter().collect();
        services.sort_by_key(|(uuid, _)| **uuid);
        for (uuid, data) in services {
            match short_uuid16(uuid) {
                Some(short) => {
                    let Some(len) = structure_len(2 + data.len()) else {
                        continue;
                    };
                    buf.put_u8(len);
                    buf.put_u8(ad_type::SERVICE_DATA_16);
                    buf.put_u16_le(short);
                }
                None => {
                    let Some(len) = structure_len(16 + data.len()) else {
                        continue;
                    };
                    buf.put_u8(len);
                    buf.put_u8(ad_type::SERVICE_DATA_128);
                    buf.put_u128_le(uuid.as_u128());
                }
            }
            buf.put_slice(data);
        }

        buf.freeze()
    }
}

/// Length byte for a structure whose body (after the type byte) is `body` bytes.
fn structure_len(body: usize) -> Option<u8> {
    u8::try_from(body + 1).ok()
}

/// Reason a platform scan could not be started or was aborted.
///
/// Codes follow the values platform scanners commonly report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanFailure {
    /// A scan with the same settings is already running.
    AlreadyStarted,
    /// The application could not be registered with the scanner.
    ApplicationRegistrationFailed,
    /// The scanner hit an internal error.
    InternalError,
    /// The hardware does not support the requested scan.
    FeatureUnsupported,
    /// No hardware resources are left to run the scan.
    OutOfHardwareResources,
    /// Scans were started too often in a short period.
    ScanningTooFrequently,
    /// A code this crate does not know about.
    Other(i32),
}

impl ScanFailure {
    /// Create from a raw failure code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::AlreadyStarted,
            2 => Self::ApplicationRegistrationFailed,
            3 => Self::InternalError,
            4 => Self::FeatureUnsupported,
            5 => Self::OutOfHardwareResources,
            6 => Self::ScanningTooFrequently,
            other => Self::Other(other),
        }
    }

    /// Convert back to the raw failure code.
    pub fn code(&self) -> i32 {
        match self {
            Self::AlreadyStarted => 1,
            Self::ApplicationRegistrationFailed => 2,
            Self::InternalError => 3,
            Self::FeatureUnsupported => 4,
            Self::OutOfHardwareResources => 5,
            Self::ScanningTooFrequently => 6,
            Self::Other(code) => *code,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::AlreadyStarted => "already started",
            Self::ApplicationRegistrationFailed => "application registration failed",
            Self::InternalError => "internal error",
            Self::FeatureUnsupported => "feature unsupported",
            Self::OutOfHardwareResources => "out of hardware resources",
            Self::ScanningTooFrequently => "scanning too frequently",
            Self::Other(_) => "unknown failure",
        }
    }
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.description(), self.code())
    }
}

/// Notification pushed by a scan facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanNotification {
    /// An advertisement was received.
    Result(AdvertisementEvent),
    /// The scan failed.
    Failed(ScanFailure),
}

/// Delivery endpoint handed to a [`ScanFacility`] for the lifetime of one scan.
///
/// Notifications are queued in the order they are pushed. Once the owning
/// session stops the scan, the receiving end is dropped and every further
/// push is discarded.
#[derive(Debug, Clone)]
pub struct ScanSink {
    tx: mpsc::UnboundedSender<ScanNotification>,
}

impl ScanSink {
    /// Create a sink together with the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an advertisement. Returns `false` if nobody is listening anymore.
    pub fn on_scan_result(&self, event: AdvertisementEvent) -> bool {
        self.tx.send(ScanNotification::Result(event)).is_ok()
    }

    /// Report a scan failure. Returns `false` if nobody is listening anymore.
    pub fn on_scan_failed(&self, failure: ScanFailure) -> bool {
        self.tx.send(ScanNotification::Failed(failure)).is_ok()
    }

    /// Check whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A platform facility able to run BLE scans.
///
/// Both calls are requests: completion and failure after the call returns
/// are reported through the [`ScanSink`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanFacility: Send + Sync {
    /// Begin scanning, delivering notifications into `sink` until stopped.
    async fn start_scan(&self, settings: &ScanSettings, sink: ScanSink) -> Result<()>;

    /// Stop the scan started by [`ScanFacility::start_scan`].
    async fn stop_scan(&self) -> Result<()>;
}
