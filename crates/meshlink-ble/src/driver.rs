//! BLE driver implementation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use smallvec::SmallVec;
use tracing::{debug, warn};

use meshlink_core::driver::{Driver, DriverCapabilities, DriverEvent, DriverEventSender};
use meshlink_core::protocol::CommandKind;
use meshlink_core::{PeerId, Result, TransportKind};

use crate::radio::{BleCallback, BleCallbackReceiver, BleRadio};

/// Documented per-send payload cap: the ATT maximum attribute length.
pub const BLE_MAX_PAYLOAD: usize = 512;

/// BLE driver configuration.
#[derive(Debug, Clone)]
pub struct BleDriverConfig {
    /// Broadcast name used when `start_advertise` is called without one
    /// having been set before.
    pub default_name: String,
}

impl Default for BleDriverConfig {
    fn default() -> Self {
        Self {
            default_name: "MeshNode".to_owned(),
        }
    }
}

/// Driver adapter over one owned [`BleRadio`].
pub struct BleDriver<R: BleRadio> {
    radio: R,
    events: DriverEventSender,
    sighted: Arc<Mutex<HashSet<PeerId>>>,
    scanning: bool,
    advertising: bool,
    config: BleDriverConfig,
}

impl<R: BleRadio> BleDriver<R> {
    /// Wrap a radio and its callback channel. Spawns the translation pump
    /// that forwards native callbacks as `DriverEvent`s.
    pub fn new(
        radio: R,
        callbacks: BleCallbackReceiver,
        events: DriverEventSender,
        config: BleDriverConfig,
    ) -> Self {
        let sighted = Arc::new(Mutex::new(HashSet::new()));
        tokio::spawn(pump(callbacks, events.clone(), Arc::clone(&sighted)));
        Self {
            radio,
            events,
            sighted,
            scanning: false,
            advertising: false,
            config,
        }
    }
}

/// Translate native callbacks into the common driver-event vocabulary.
async fn pump(
    mut callbacks: BleCallbackReceiver,
    events: DriverEventSender,
    sighted: Arc<Mutex<HashSet<PeerId>>>,
) {
    while let Some(callback) = callbacks.recv().await {
        let event = match callback {
            BleCallback::Sighting {
                address,
                name,
                rssi,
            } => {
                let id = PeerId::new(address.clone());
                if let Ok(mut set) = sighted.lock() {
                    set.insert(id.clone());
                }
                DriverEvent::PeerSighted {
                    kind: TransportKind::Ble,
                    id,
                    name,
                    address: Some(address),
                    rssi: Some(rssi),
                }
            }
            BleCallback::ScanFailed { reason } => {
                warn!(%reason, "BLE scan failed");
                DriverEvent::NativeFailure {
                    kind: TransportKind::Ble,
                    operation: CommandKind::StartDiscovery,
                    reason,
                }
            }
            BleCallback::AdvertiseFailed { reason } => {
                warn!(%reason, "BLE advertise failed");
                DriverEvent::NativeFailure {
                    kind: TransportKind::Ble,
                    operation: CommandKind::StartAdvertise,
                    reason,
                }
            }
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

#[async_trait]
impl<R: BleRadio> Driver for BleDriver<R> {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            kind: TransportKind::Ble,
            max_payload: BLE_MAX_PAYLOAD,
            supports_connections: false,
            reports_peer_loss: false,
        }
    }

    async fn start_discovery(&mut self) -> Result<()> {
        if self.scanning {
            return Ok(());
        }
        self.radio
            .start_scan()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Ble, "startScan"))?;
        self.scanning = true;
        debug!("BLE scan started");
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<()> {
        if !self.scanning {
            return Ok(());
        }
        self.radio
            .stop_scan()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Ble, "stopScan"))?;
        self.scanning = false;
        debug!("BLE scan stopped");
        Ok(())
    }

    async fn start_advertise(&mut self, name: &str) -> Result<()> {
        if self.advertising {
            return Ok(());
        }
        let name = if name.is_empty() {
            self.config.default_name.as_str()
        } else {
            name
        };
        self.radio
            .start_advertise(name)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Ble, "advertise"))?;
        self.advertising = true;
        debug!(%name, "BLE advertising started");
        Ok(())
    }

    async fn stop_advertise(&mut self) -> Result<()> {
        if !self.advertising {
            return Ok(());
        }
        self.radio
            .stop_advertise()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Ble, "stopAdvertise"))?;
        self.advertising = false;
        debug!("BLE advertising stopped");
        Ok(())
    }

    async fn connect(&mut self, peer: &PeerId) -> Result<()> {
        // No connection concept: a broadcast peer is as reachable as it will
        // ever be, so the outcome resolves immediately.
        self.events
            .send(DriverEvent::ConnectionOutcome {
                kind: TransportKind::Ble,
                id: peer.clone(),
                success: true,
                inbound: false,
            })
            .await
            .map_err(|_| meshlink_core::MeshError::channel("driver event channel closed"))?;
        Ok(())
    }

    async fn send(&mut self, peer: &PeerId, data: Vec<u8>) -> Result<()> {
        // Payload delivery over broadcast frames is not implemented by the
        // platform layer; accept and drop.
        debug!(peer = %peer, len = data.len(), "BLE send is a no-op");
        Ok(())
    }

    fn known_peers(&self) -> SmallVec<[PeerId; 8]> {
        self.sighted
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::BleCallbackSender;
    use meshlink_core::NativeError;
    use tokio::sync::mpsc;

    /// Scripted radio: records native calls, can be told to fail.
    struct FakeRadio {
        calls: Vec<String>,
        fail_with: Option<NativeError>,
    }

    impl FakeRadio {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                fail_with: None,
            }
        }

        fn failing(err: NativeError) -> Self {
            Self {
                calls: Vec::new(),
                fail_with: Some(err),
            }
        }

        fn check(&mut self, call: &str) -> std::result::Result<(), NativeError> {
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            self.calls.push(call.to_owned());
            Ok(())
        }
    }

    #[async_trait]
    impl BleRadio for FakeRadio {
        async fn start_scan(&mut self) -> std::result::Result<(), NativeError> {
            self.check("start_scan")
        }
        async fn stop_scan(&mut self) -> std::result::Result<(), NativeError> {
            self.check("stop_scan")
        }
        async fn start_advertise(&mut self, name: &str) -> std::result::Result<(), NativeError> {
            self.check(&format!("advertise:{name}"))
        }
        async fn stop_advertise(&mut self) -> std::result::Result<(), NativeError> {
            self.check("stop_advertise")
        }
    }

    fn build_driver(
        radio: FakeRadio,
    ) -> (
        BleDriver<FakeRadio>,
        BleCallbackSender,
        meshlink_core::driver::DriverEventReceiver,
    ) {
        let (cb_tx, cb_rx) = mpsc::channel(16);
        let (ev_tx, ev_rx) = mpsc::channel(16);
        let driver = BleDriver::new(radio, cb_rx, ev_tx, BleDriverConfig::default());
        (driver, cb_tx, ev_rx)
    }

    #[tokio::test]
    async fn start_discovery_is_idempotent() {
        let (mut driver, _cb, _ev) = build_driver(FakeRadio::new());
        driver.start_discovery().await.unwrap();
        driver.start_discovery().await.unwrap();
        assert_eq!(driver.radio.calls, vec!["start_scan"]);
    }

    #[tokio::test]
    async fn permission_denied_surfaces_as_permission_error() {
        let (mut driver, _cb, _ev) = build_driver(FakeRadio::failing(NativeError::PermissionDenied));
        let err = driver.start_discovery().await.unwrap_err();
        assert!(matches!(err, meshlink_core::MeshError::Permission { .. }));
    }

    #[tokio::test]
    async fn radio_off_surfaces_as_unavailable() {
        let (mut driver, _cb, _ev) =
            build_driver(FakeRadio::failing(NativeError::Unavailable("radio off".into())));
        let err = driver.start_advertise("X").await.unwrap_err();
        assert!(matches!(err, meshlink_core::MeshError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn sighting_translates_to_peer_sighted() {
        let (driver, cb, mut ev) = build_driver(FakeRadio::new());
        cb.send(BleCallback::Sighting {
            address: "AA:BB:CC:DD:EE:FF".into(),
            name: "Phone".into(),
            rssi: -58,
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::PeerSighted {
                kind,
                id,
                name,
                address,
                rssi,
            } => {
                assert_eq!(kind, TransportKind::Ble);
                assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
                assert_eq!(name, "Phone");
                assert_eq!(address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
                assert_eq!(rssi, Some(-58));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(driver.known_peers().len(), 1);
    }

    #[tokio::test]
    async fn connect_resolves_immediately() {
        let (mut driver, _cb, mut ev) = build_driver(FakeRadio::new());
        driver.connect(&PeerId::new("AA:BB")).await.unwrap();
        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome {
                id,
                success,
                inbound,
                ..
            } => {
                assert_eq!(id.as_str(), "AA:BB");
                assert!(success);
                assert!(!inbound);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_is_noop_success() {
        let (mut driver, _cb, _ev) = build_driver(FakeRadio::new());
        driver.send(&PeerId::new("AA:BB"), vec![1, 2, 3]).await.unwrap();
        assert!(driver.radio.calls.is_empty());
    }

    #[tokio::test]
    async fn advertise_uses_default_name_when_empty() {
        let (mut driver, _cb, _ev) = build_driver(FakeRadio::new());
        driver.start_advertise("").await.unwrap();
        assert_eq!(driver.radio.calls, vec!["advertise:MeshNode"]);
    }

    #[tokio::test]
    async fn scan_failure_becomes_native_failure_event() {
        let (_driver, cb, mut ev) = build_driver(FakeRadio::new());
        cb.send(BleCallback::ScanFailed {
            reason: "controller reset".into(),
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::NativeFailure {
                operation, reason, ..
            } => {
                assert_eq!(operation, CommandKind::StartDiscovery);
                assert_eq!(reason, "controller reset");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
