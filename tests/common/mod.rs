//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ble_device_scanner::{AdvertisementEvent, Result, ScanFacility, ScanSettings, ScanSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scan facility that hands the latest sink to the test.
#[derive(Default)]
pub struct FakeScanFacility {
    sink: Mutex<Option<ScanSink>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeScanFacility {
    /// Sink of the most recent scan.
    pub fn sink(&self) -> ScanSink {
        self.sink.lock().clone().expect("scan was never started")
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanFacility for FakeScanFacility {
    async fn start_scan(&self, _settings: &ScanSettings, sink: ScanSink) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn event(identifier: &str, name: Option<&str>) -> AdvertisementEvent {
    AdvertisementEvent::new(identifier, name.map(str::to_string))
}

/// Address whose last two bytes encode `n`.
pub fn address(n: u16) -> String {
    let [hi, lo] = n.to_be_bytes();
    format!("C0:FF:EE:00:{:02X}:{:02X}", hi, lo)
}

/// Flags plus an iBeacon manufacturer data structure.
pub fn ibeacon_payload() -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06];
    data.extend_from_slice(&[0x1A, 0xFF, 0x4C, 0x00, 0x02, 0x15]);
    data.extend_from_slice(&[
        0xE2, 0xC5, 0x6D, 0xB5, 0xDF, 0xFB, 0x48, 0xD2, 0xB0, 0x60, 0xD0, 0xF5, 0xA7, 0x10, 0x96,
        0xE0,
    ]);
    data.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0xC5]);
    data
}

/// Poll until `check` holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
