mod common;

use ble_device_scanner::{DiscoverySession, ScanSettings, SessionConfig};
use common::{address, event, eventually, ibeacon_payload, FakeScanFacility};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::io;
use std::sync::Arc;
use tokio_test::assert_ok;
use tracing::subscriber::DefaultGuard;

/// Log output collected by a thread-local subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn count(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock()).matches(needle).count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Feed a beacon twice, then an unrelated device, and wait for both inserts.
async fn scan_beacon_twice(settings: ScanSettings) {
    let facility = Arc::new(FakeScanFacility::default());
    let session = DiscoverySession::new(
        facility.clone(),
        SessionConfig::default().with_settings(settings),
    );
    assert_ok!(session.start().await);

    let sink = facility.sink();
    sink.on_scan_result(event(&address(1), None).with_payload(ibeacon_payload()));
    sink.on_scan_result(event(&address(1), None).with_payload(ibeacon_payload()));
    sink.on_scan_result(event(&address(2), None));

    // The sink is drained in order, so the duplicate has been seen too.
    eventually(|| session.registry().len() == 2).await;
    assert_ok!(session.shutdown().await);
}

// Single-threaded runtime: the pump task logs on the thread holding the guard.
#[tokio::test]
async fn beacons_are_logged_once_per_new_device() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    scan_beacon_twice(ScanSettings::default()).await;

    assert_eq!(logs.count("iBeacon found:"), 1);
    assert_eq!(logs.count(&format!("Address: {}", address(1))), 1);
}

#[tokio::test]
async fn beacon_logging_can_be_disabled() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    scan_beacon_twice(ScanSettings::default().with_beacon_logging(false)).await;

    assert_eq!(logs.count("iBeacon found:"), 0);
    assert_eq!(logs.count(&format!("Registered device: Unknown Device - {}", address(1))), 1);
}
