//! Discovery session: scan lifecycle and event dispatch.
//!
//! A [`DiscoverySession`] owns one [`DeviceRegistry`] and drives a
//! [`ScanFacility`]. Every `start` opens a new scan epoch with its own
//! [`ScanSink`]; a background task drains that sink in delivery order and
//! feeds each advertisement into the registry. Notifications from an epoch
//! that has since been stopped or restarted are discarded.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::ble::advertising;
use crate::ble::facility::{
    AdvertisementEvent, ScanFacility, ScanFailure, ScanNotification, ScanSink,
};
use crate::ble::scanner::BtleplugScanFacility;
use crate::config::{ScanSettings, SessionConfig};
use crate::error::Result;
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::utils::join_bytes;

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Scan state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No scan is running; incoming events are discarded.
    #[default]
    Idle,
    /// A scan is running and events are registered.
    Scanning,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
        }
    }
}

/// Notification emitted by a [`DiscoverySession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// The scan facility reported a failure. The session state is unchanged.
    ScanFailed(ScanFailure),
}

/// Admission state checked on every delivered event.
struct Gate {
    state: SessionState,
    epoch: u64,
}

/// State shared between the session handle and its pump task.
struct Shared {
    registry: Arc<DeviceRegistry>,
    gate: RwLock<Gate>,
    settings: ScanSettings,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Shared {
    /// Register `event` if the session is scanning and `epoch` (when given) is current.
    fn accept(&self, epoch: Option<u64>, event: &AdvertisementEvent) -> bool {
        let inserted = {
            // Held across the insert so a restart cannot clear in between.
            let gate = self.gate.read();
            if gate.state != SessionState::Scanning || epoch.is_some_and(|e| e != gate.epoch) {
                trace!(
                    "Discarding advertisement from {} (stale scan)",
                    event.device_identifier
                );
                return false;
            }
            self.registry.insert_if_absent(event)
        };

        if inserted && self.settings.log_beacons {
            log_beacons(event);
        }

        inserted
    }

    fn report_failure(&self, epoch: Option<u64>, failure: ScanFailure) {
        {
            let gate = self.gate.read();
            if epoch.is_some_and(|e| e != gate.epoch) {
                debug!("Ignoring failure from a stale scan: {}", failure);
                return;
            }
        }

        warn!("Scan failed: {}", failure);
        let _ = self.event_tx.send(SessionEvent::ScanFailed(failure));
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.event_tx.send(SessionEvent::StateChanged(state));
    }
}

/// Log every recognised beacon structure in an advertisement payload.
fn log_beacons(event: &AdvertisementEvent) {
    let structures = match advertising::beacons(&event.raw_payload) {
        Ok(structures) => structures,
        Err(e) => {
            debug!(
                "Skipping beacon diagnostics for {}: {}",
                event.device_identifier, e
            );
            return;
        }
    };

    for structure in structures {
        if let Some(kind) = structure.beacon_kind() {
            debug!(
                "{} found: {} Address: {} Bytes: {}",
                kind,
                structure,
                event.device_identifier,
                join_bytes(&event.raw_payload)
            );
        }
    }
}

/// A BLE discovery session over a single device registry.
pub struct DiscoverySession {
    /// Platform scanner.
    facility: Arc<dyn ScanFacility>,
    /// Registry, gate and event channel.
    shared: Arc<Shared>,
    /// Pump task of the current scan. The lock also serialises start/stop/restart.
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoverySession {
    /// Create an idle session on top of `facility`.
    pub fn new(facility: Arc<dyn ScanFacility>, config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            facility,
            shared: Arc::new(Shared {
                registry: Arc::new(DeviceRegistry::new(config.aliases)),
                gate: RwLock::new(Gate {
                    state: SessionState::Idle,
                    epoch: 0,
                }),
                settings: config.settings,
                event_tx,
            }),
            pump: Mutex::new(None),
        }
    }

    /// Create an idle session using the first Bluetooth adapter on this system.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn with_bluetooth(config: SessionConfig) -> Result<Self> {
        let facility = BtleplugScanFacility::new().await?;
        Ok(Self::new(Arc::new(facility), config))
    }

    /// Start scanning. Does nothing if already scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan facility rejects the request; the session
    /// stays idle.
    pub async fn start(&self) -> Result<()> {
        let mut pump = self.pump.lock().await;
        self.start_locked(&mut pump).await
    }

    /// Stop scanning. Does nothing if idle.
    ///
    /// Events delivered after this call are discarded even if the facility is
    /// still flushing them.
    pub async fn stop(&self) -> Result<()> {
        let mut pump = self.pump.lock().await;
        self.stop_locked(&mut pump).await
    }

    /// Clear the registry, then stop and start the scan.
    ///
    /// No event delivered before the clear can appear in the registry afterwards.
    pub async fn restart(&self) -> Result<()> {
        let mut pump = self.pump.lock().await;

        info!("Restarting BLE scan");
        {
            let mut gate = self.shared.gate.write();
            self.shared.registry.clear();
            gate.epoch += 1;
        }

        if let Err(e) = self.stop_locked(&mut pump).await {
            warn!("Error stopping scan during restart: {}", e);
        }

        self.start_locked(&mut pump).await
    }

    /// Stop scanning and release the scan facility.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down discovery session");
        self.stop().await
    }

    /// Register an advertisement received outside the facility's sink.
    ///
    /// Returns `true` if a new device was registered. Events are only accepted
    /// while scanning.
    pub fn on_event(&self, event: &AdvertisementEvent) -> bool {
        self.shared.accept(None, event)
    }

    /// Report a scan failure received outside the facility's sink.
    pub fn on_scan_failed(&self, failure: ScanFailure) {
        self.shared.report_failure(None, failure);
    }

    /// Current scan state.
    pub fn state(&self) -> SessionState {
        self.shared.gate.read().state
    }

    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.state() == SessionState::Scanning
    }

    /// The registry this session feeds.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.shared.registry.clone()
    }

    /// Copy of the registered devices in discovery order.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.shared.registry.snapshot()
    }

    /// Scan settings passed to the facility.
    pub fn settings(&self) -> &ScanSettings {
        &self.shared.settings
    }

    /// Subscribe to session state changes and scan failures.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    async fn start_locked(&self, pump: &mut Option<JoinHandle<()>>) -> Result<()> {
        if self.is_scanning() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan");

        let (sink, rx) = ScanSink::channel();
        self.facility
            .start_scan(&self.shared.settings, sink)
            .await?;

        let epoch = {
            let mut gate = self.shared.gate.write();
            gate.epoch += 1;
            gate.state = SessionState::Scanning;
            gate.epoch
        };

        *pump = Some(spawn_pump(self.shared.clone(), epoch, rx));
        self.shared.set_state(SessionState::Scanning);

        Ok(())
    }

    async fn stop_locked(&self, pump: &mut Option<JoinHandle<()>>) -> Result<()> {
        if !self.is_scanning() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        {
            let mut gate = self.shared.gate.write();
            gate.state = SessionState::Idle;
            gate.epoch += 1;
        }

        if let Some(handle) = pump.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.shared.set_state(SessionState::Idle);
        self.facility.stop_scan().await
    }
}

/// Drain one scan's sink into the registry.
fn spawn_pump(
    shared: Arc<Shared>,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<ScanNotification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match notification {
                ScanNotification::Result(event) => {
                    shared.accept(Some(epoch), &event);
                }
                ScanNotification::Failed(failure) => {
                    shared.report_failure(Some(epoch), failure);
                }
            }
        }

        debug!("Scan event pump for epoch {} ended", epoch);
    })
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        let was_scanning = {
            let mut gate = self.shared.gate.write();
            let was_scanning = gate.state == SessionState::Scanning;
            gate.state = SessionState::Idle;
            gate.epoch += 1;
            was_scanning
        };

        if let Some(handle) = self.pump.get_mut().take() {
            handle.abort();
        }

        if !was_scanning {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let facility = self.facility.clone();
                runtime.spawn(async move {
                    if let Err(e) = facility.stop_scan().await {
                        warn!("Error stopping scan on drop: {}", e);
                    }
                });
            }
            Err(_) => warn!("Discovery session dropped outside a runtime, scan left running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::facility::MockScanFacility;
    use crate::error::Error;
    use std::time::Duration;

    type SinkSlot = Arc<parking_lot::Mutex<Option<ScanSink>>>;

    /// A mock facility that accepts any number of starts and keeps the latest sink.
    fn capturing_facility() -> (MockScanFacility, SinkSlot) {
        let slot: SinkSlot = Arc::new(parking_lot::Mutex::new(None));
        let mut facility = MockScanFacility::new();
        let captured = slot.clone();
        facility.expect_start_scan().returning(move |_, sink| {
            *captured.lock() = Some(sink);
            Ok(())
        });
        facility.expect_stop_scan().returning(|| Ok(()));
        (facility, slot)
    }

    fn session_with(facility: MockScanFacility) -> DiscoverySession {
        DiscoverySession::new(Arc::new(facility), SessionConfig::default())
    }

    fn event(identifier: &str) -> AdvertisementEvent {
        AdvertisementEvent::new(identifier, None)
    }

    async fn wait_for_len(session: &DiscoverySession, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while session.registry().len() != len {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("registry did not reach expected size");
    }

    #[tokio::test]
    async fn test_start_is_guarded() {
        let mut facility = MockScanFacility::new();
        facility
            .expect_start_scan()
            .times(1)
            .returning(|_, _| Ok(()));
        facility.expect_stop_scan().times(1).returning(|| Ok(()));

        let session = session_with(facility);
        assert_eq!(session.state(), SessionState::Idle);

        session.start().await.unwrap();
        session.start().await.unwrap();
        assert!(session.is_scanning());

        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let mut facility = MockScanFacility::new();
        facility.expect_stop_scan().never();

        let session = session_with(facility);
        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_failure_stays_idle() {
        let mut facility = MockScanFacility::new();
        facility.expect_start_scan().returning(|_, _| {
            Err(Error::ScanFailed {
                failure: ScanFailure::FeatureUnsupported,
            })
        });

        let session = session_with(facility);
        assert!(session.start().await.is_err());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_settings_are_passed_to_facility() {
        let mut facility = MockScanFacility::new();
        facility
            .expect_start_scan()
            .withf(|settings, _| !settings.log_beacons)
            .times(1)
            .returning(|_, _| Ok(()));
        facility.expect_stop_scan().returning(|| Ok(()));

        let config = SessionConfig::default()
            .with_settings(ScanSettings::default().with_beacon_logging(false));
        let session = DiscoverySession::new(Arc::new(facility), config);
        session.start().await.unwrap();
        assert!(!session.settings().log_beacons);
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_events_reach_registry() {
        let (facility, slot) = capturing_facility();
        let session = session_with(facility);
        session.start().await.unwrap();

        let sink = slot.lock().clone().unwrap();
        sink.on_scan_result(event("00:00:00:00:00:01"));
        sink.on_scan_result(event("00:00:00:00:00:02"));
        sink.on_scan_result(event("00:00:00:00:00:01"));

        wait_for_len(&session, 2).await;
        let ids: Vec<_> = session
            .snapshot()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["00:00:00:00:00:01", "00:00:00:00:00:02"]);
    }

    #[tokio::test]
    async fn test_events_after_stop_are_discarded() {
        let (facility, slot) = capturing_facility();
        let session = session_with(facility);
        session.start().await.unwrap();
        let sink = slot.lock().clone().unwrap();

        session.stop().await.unwrap();

        assert!(!sink.on_scan_result(event("00:00:00:00:00:01")));
        assert!(!session.on_event(&event("00:00:00:00:00:02")));
        assert!(session.registry().is_empty());
    }

    #[tokio::test]
    async fn test_restart_drops_stale_sink() {
        let (facility, slot) = capturing_facility();
        let session = session_with(facility);

        session.start().await.unwrap();
        let old_sink = slot.lock().clone().unwrap();
        old_sink.on_scan_result(event("00:00:00:00:00:01"));
        wait_for_len(&session, 1).await;

        session.restart().await.unwrap();
        assert!(session.registry().is_empty());
        assert!(session.is_scanning());

        let new_sink = slot.lock().clone().unwrap();
        old_sink.on_scan_result(event("00:00:00:00:00:09"));
        new_sink.on_scan_result(event("00:00:00:00:00:01"));
        wait_for_len(&session, 1).await;

        assert!(session.registry().contains("00:00:00:00:00:01"));
        assert!(!session.registry().contains("00:00:00:00:00:09"));
    }

    #[tokio::test]
    async fn test_scan_failure_keeps_state() {
        let (facility, slot) = capturing_facility();
        let session = session_with(facility);
        let mut events = session.subscribe();

        session.start().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged(SessionState::Scanning)
        );

        let sink = slot.lock().clone().unwrap();
        sink.on_scan_failed(ScanFailure::InternalError);

        let received = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, SessionEvent::ScanFailed(ScanFailure::InternalError));
        assert!(session.is_scanning());
    }

    #[tokio::test]
    async fn test_drop_releases_scan() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut facility = MockScanFacility::new();
        facility.expect_start_scan().returning(|_, _| Ok(()));
        facility.expect_stop_scan().times(1).returning(move || {
            let _ = tx.send(());
            Ok(())
        });

        let session = session_with(facility);
        session.start().await.unwrap();
        drop(session);

        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
}
