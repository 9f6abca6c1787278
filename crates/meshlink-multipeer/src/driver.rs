//! Multicast session driver implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use smallvec::SmallVec;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use meshlink_core::driver::{Driver, DriverCapabilities, DriverEvent, DriverEventSender};
use meshlink_core::protocol::CommandKind;
use meshlink_core::{PeerId, Result, TransportKind};

use crate::session::{SessionCallback, SessionCallbackReceiver, SessionHost, SessionState};

/// Practical framed-message cap for session payloads.
pub const MULTIPEER_MAX_PAYLOAD: usize = 65_536;

/// How long an outbound invitation stays open before the service expires it.
pub const INVITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Synthetic signal strength for session sightings.
const SESSION_RSSI: i16 = -40;

/// Multipeer driver configuration.
#[derive(Debug, Clone)]
pub struct MultipeerDriverConfig {
    /// Display name advertised when `start_advertise` is called without one.
    pub default_name: String,
    pub invite_timeout: Duration,
}

impl Default for MultipeerDriverConfig {
    fn default() -> Self {
        Self {
            default_name: "MeshNode".to_owned(),
            invite_timeout: INVITE_TIMEOUT,
        }
    }
}

/// Driver adapter over one owned [`SessionHost`].
///
/// The host is shared with the callback pump behind a mutex: the pump calls
/// back into the host to accept invitations.
pub struct MultipeerDriver<H: SessionHost + 'static> {
    host: Arc<Mutex<H>>,
    sighted: Arc<std::sync::Mutex<HashSet<PeerId>>>,
    browsing: bool,
    advertising: bool,
    config: MultipeerDriverConfig,
}

impl<H: SessionHost + 'static> MultipeerDriver<H> {
    pub fn new(
        host: H,
        callbacks: SessionCallbackReceiver,
        events: DriverEventSender,
        config: MultipeerDriverConfig,
    ) -> Self {
        let host = Arc::new(Mutex::new(host));
        let sighted = Arc::new(std::sync::Mutex::new(HashSet::new()));
        tokio::spawn(pump(
            callbacks,
            events,
            Arc::clone(&host),
            Arc::clone(&sighted),
        ));
        Self {
            host,
            sighted,
            browsing: false,
            advertising: false,
            config,
        }
    }
}

/// Translate session callbacks into driver events.
///
/// The session reports bare state transitions, so the pump keeps the last
/// observed phase per peer to tell a failed handshake (Connecting →
/// NotConnected) apart from a dropped link (Connected → NotConnected).
async fn pump<H: SessionHost>(
    mut callbacks: SessionCallbackReceiver,
    events: DriverEventSender,
    host: Arc<Mutex<H>>,
    sighted: Arc<std::sync::Mutex<HashSet<PeerId>>>,
) {
    let mut phases: HashMap<String, SessionState> = HashMap::new();
    let mut inbound: HashSet<String> = HashSet::new();

    while let Some(callback) = callbacks.recv().await {
        match callback {
            SessionCallback::PeerFound { id } => {
                let peer = PeerId::new(id.clone());
                if let Ok(mut set) = sighted.lock() {
                    set.insert(peer.clone());
                }
                let event = DriverEvent::PeerSighted {
                    kind: TransportKind::Multipeer,
                    id: peer,
                    name: id,
                    address: None,
                    rssi: Some(SESSION_RSSI),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            SessionCallback::PeerLost { id } => {
                // The platform layer ignores lost-peer; staleness is the
                // coordinator's policy. Only the local sighting set is pruned.
                let peer = PeerId::new(id);
                if let Ok(mut set) = sighted.lock() {
                    set.remove(&peer);
                }
                debug!(peer = %peer, "peer lost (ignored)");
            }
            SessionCallback::InvitationReceived { id } => {
                inbound.insert(id.clone());
                let accepted = host.lock().await.accept_invitation(&id).await;
                if let Err(err) = accepted {
                    warn!(peer = %id, %err, "accepting invitation failed");
                    inbound.remove(&id);
                    let event = DriverEvent::NativeFailure {
                        kind: TransportKind::Multipeer,
                        operation: CommandKind::Connect,
                        reason: err.to_string(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
            SessionCallback::StateChanged { id, state } => {
                let previous = phases.insert(id.clone(), state);
                let peer = PeerId::new(id.clone());
                match state {
                    SessionState::Connecting => {}
                    SessionState::Connected => {
                        let was_inbound = inbound.remove(&id);
                        if was_inbound {
                            // The inviter may never have been browsed locally,
                            // or may have aged out upstream since its last
                            // sighting; surface it before its connection
                            // result so the result is never orphaned.
                            if let Ok(mut set) = sighted.lock() {
                                set.insert(peer.clone());
                            }
                            let sighting = DriverEvent::PeerSighted {
                                kind: TransportKind::Multipeer,
                                id: peer.clone(),
                                name: id.clone(),
                                address: None,
                                rssi: Some(SESSION_RSSI),
                            };
                            if events.send(sighting).await.is_err() {
                                break;
                            }
                        }
                        let event = DriverEvent::ConnectionOutcome {
                            kind: TransportKind::Multipeer,
                            id: peer,
                            success: true,
                            inbound: was_inbound,
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    SessionState::NotConnected => {
                        phases.remove(&id);
                        let event = match previous {
                            Some(SessionState::Connected) => DriverEvent::Disconnected {
                                kind: TransportKind::Multipeer,
                                id: peer,
                            },
                            Some(SessionState::Connecting) => DriverEvent::ConnectionOutcome {
                                kind: TransportKind::Multipeer,
                                id: peer,
                                success: false,
                                inbound: inbound.remove(&id),
                            },
                            _ => {
                                debug!(peer = %id, "spurious not-connected, ignored");
                                continue;
                            }
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
            SessionCallback::DataReceived { id, data } => {
                let event = DriverEvent::PayloadArrived {
                    kind: TransportKind::Multipeer,
                    from: PeerId::new(id),
                    data,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<H: SessionHost + 'static> Driver for MultipeerDriver<H> {
    fn kind(&self) -> TransportKind {
        TransportKind::Multipeer
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            kind: TransportKind::Multipeer,
            max_payload: MULTIPEER_MAX_PAYLOAD,
            supports_connections: true,
            reports_peer_loss: false,
        }
    }

    async fn start_discovery(&mut self) -> Result<()> {
        if self.browsing {
            return Ok(());
        }
        self.host
            .lock()
            .await
            .start_browsing()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Multipeer, "startDiscovery"))?;
        self.browsing = true;
        debug!("browsing started");
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<()> {
        if !self.browsing {
            return Ok(());
        }
        self.host
            .lock()
            .await
            .stop_browsing()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Multipeer, "stopDiscovery"))?;
        self.browsing = false;
        debug!("browsing stopped");
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
        self.host
            .lock()
            .await
            .start_advertising(name)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Multipeer, "advertise"))?;
        self.advertising = true;
        debug!(%name, "advertising started");
        Ok(())
    }

    async fn stop_advertise(&mut self) -> Result<()> {
        if !self.advertising {
            return Ok(());
        }
        self.host
            .lock()
            .await
            .stop_advertising()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Multipeer, "stopAdvertise"))?;
        self.advertising = false;
        debug!("advertising stopped");
        Ok(())
    }

    async fn connect(&mut self, peer: &PeerId) -> Result<()> {
        self.host
            .lock()
            .await
            .invite(peer.as_str(), self.config.invite_timeout)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Multipeer, "connect"))?;
        debug!(peer = %peer, "invitation sent");
        Ok(())
    }

    async fn send(&mut self, peer: &PeerId, data: Vec<u8>) -> Result<()> {
        self.host
            .lock()
            .await
            .send(peer.as_str(), data)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Multipeer, "send"))?;
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
    use crate::session::SessionCallbackSender;
    use meshlink_core::driver::DriverEventReceiver;
    use meshlink_core::NativeError;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeHost {
        calls: Arc<StdMutex<Vec<String>>>,
        fail_with: Option<NativeError>,
    }

    impl FakeHost {
        fn record(&self, call: String) -> std::result::Result<(), NativeError> {
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl SessionHost for FakeHost {
        async fn start_browsing(&mut self) -> std::result::Result<(), NativeError> {
            self.record("browse".into())
        }
        async fn stop_browsing(&mut self) -> std::result::Result<(), NativeError> {
            self.record("stop_browse".into())
        }
        async fn start_advertising(&mut self, name: &str) -> std::result::Result<(), NativeError> {
            self.record(format!("advertise:{name}"))
        }
        async fn stop_advertising(&mut self) -> std::result::Result<(), NativeError> {
            self.record("stop_advertise".into())
        }
        async fn invite(
            &mut self,
            peer: &str,
            timeout: Duration,
        ) -> std::result::Result<(), NativeError> {
            self.record(format!("invite:{peer}:{}", timeout.as_secs()))
        }
        async fn accept_invitation(&mut self, peer: &str) -> std::result::Result<(), NativeError> {
            self.record(format!("accept:{peer}"))
        }
        async fn send(
            &mut self,
            peer: &str,
            data: Vec<u8>,
        ) -> std::result::Result<(), NativeError> {
            self.record(format!("send:{peer}:{}", data.len()))
        }
        async fn disconnect(&mut self, peer: &str) -> std::result::Result<(), NativeError> {
            self.record(format!("disconnect:{peer}"))
        }
    }

    fn build_driver() -> (
        MultipeerDriver<FakeHost>,
        SessionCallbackSender,
        DriverEventReceiver,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let host = FakeHost::default();
        let calls = Arc::clone(&host.calls);
        let (cb_tx, cb_rx) = mpsc::channel(16);
        let (ev_tx, ev_rx) = mpsc::channel(16);
        let driver = MultipeerDriver::new(host, cb_rx, ev_tx, MultipeerDriverConfig::default());
        (driver, cb_tx, ev_rx, calls)
    }

    #[tokio::test]
    async fn peer_found_translates_to_sighting() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(SessionCallback::PeerFound { id: "Alice".into() })
            .await
            .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::PeerSighted { id, name, rssi, .. } => {
                assert_eq!(id.as_str(), "Alice");
                assert_eq!(name, "Alice");
                assert_eq!(rssi, Some(SESSION_RSSI));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn peer_lost_is_ignored() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(SessionCallback::PeerFound { id: "Alice".into() })
            .await
            .unwrap();
        cb.send(SessionCallback::PeerLost { id: "Alice".into() })
            .await
            .unwrap();
        cb.send(SessionCallback::DataReceived {
            id: "Alice".into(),
            data: vec![9],
        })
        .await
        .unwrap();

        assert!(matches!(
            ev.recv().await.unwrap(),
            DriverEvent::PeerSighted { .. }
        ));
        // The next event is the payload; the lost callback produced none.
        assert!(matches!(
            ev.recv().await.unwrap(),
            DriverEvent::PayloadArrived { .. }
        ));
    }

    #[tokio::test]
    async fn invitation_is_auto_accepted() {
        let (_driver, cb, mut ev, calls) = build_driver();
        cb.send(SessionCallback::InvitationReceived { id: "Bob".into() })
            .await
            .unwrap();
        cb.send(SessionCallback::StateChanged {
            id: "Bob".into(),
            state: SessionState::Connected,
        })
        .await
        .unwrap();

        // Never browsed, so a sighting precedes the inbound outcome.
        match ev.recv().await.unwrap() {
            DriverEvent::PeerSighted { id, .. } => assert_eq!(id.as_str(), "Bob"),
            other => panic!("unexpected event: {other:?}"),
        }
        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome {
                success, inbound, ..
            } => {
                assert!(success);
                assert!(inbound);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(calls.lock().unwrap().contains(&"accept:Bob".to_string()));
    }

    #[tokio::test]
    async fn inbound_connect_resights_previously_browsed_peer() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        // Bob was browsed earlier; the record upstream may have aged out by
        // the time his invitation lands.
        cb.send(SessionCallback::PeerFound { id: "Bob".into() })
            .await
            .unwrap();
        cb.send(SessionCallback::InvitationReceived { id: "Bob".into() })
            .await
            .unwrap();
        cb.send(SessionCallback::StateChanged {
            id: "Bob".into(),
            state: SessionState::Connected,
        })
        .await
        .unwrap();

        assert!(matches!(
            ev.recv().await.unwrap(),
            DriverEvent::PeerSighted { .. }
        ));
        // A fresh sighting still precedes the inbound outcome.
        assert!(matches!(
            ev.recv().await.unwrap(),
            DriverEvent::PeerSighted { .. }
        ));
        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome {
                id,
                success,
                inbound,
                ..
            } => {
                assert_eq!(id.as_str(), "Bob");
                assert!(success);
                assert!(inbound);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_handshake_reports_unsuccessful_outcome() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(SessionCallback::StateChanged {
            id: "Carol".into(),
            state: SessionState::Connecting,
        })
        .await
        .unwrap();
        cb.send(SessionCallback::StateChanged {
            id: "Carol".into(),
            state: SessionState::NotConnected,
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome { id, success, .. } => {
                assert_eq!(id.as_str(), "Carol");
                assert!(!success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_link_reports_disconnected() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(SessionCallback::StateChanged {
            id: "Dave".into(),
            state: SessionState::Connected,
        })
        .await
        .unwrap();
        cb.send(SessionCallback::StateChanged {
            id: "Dave".into(),
            state: SessionState::NotConnected,
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome { success, .. } => assert!(success),
            other => panic!("unexpected event: {other:?}"),
        }
        match ev.recv().await.unwrap() {
            DriverEvent::Disconnected { id, .. } => assert_eq!(id.as_str(), "Dave"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_sends_timed_invitation() {
        let (mut driver, _cb, _ev, calls) = build_driver();
        driver.connect(&PeerId::new("Erin")).await.unwrap();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &["invite:Erin:10".to_string()]
        );
    }

    #[tokio::test]
    async fn browse_is_idempotent() {
        let (mut driver, _cb, _ev, calls) = build_driver();
        driver.start_discovery().await.unwrap();
        driver.start_discovery().await.unwrap();
        driver.stop_discovery().await.unwrap();
        driver.stop_discovery().await.unwrap();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &["browse".to_string(), "stop_browse".to_string()]
        );
    }

    #[tokio::test]
    async fn data_received_translates_to_payload() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(SessionCallback::DataReceived {
            id: "Frank".into(),
            data: vec![1, 2, 3],
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::PayloadArrived { from, data, .. } => {
                assert_eq!(from.as_str(), "Frank");
                assert_eq!(data, vec![1, 2, 3]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
