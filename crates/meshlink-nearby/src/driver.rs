//! Discovery-service driver implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use smallvec::SmallVec;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use meshlink_core::driver::{Driver, DriverCapabilities, DriverEvent, DriverEventSender};
use meshlink_core::protocol::CommandKind;
use meshlink_core::{PeerId, Result, TransportKind};

use crate::client::{ConnectionsClient, NearbyCallback, NearbyCallbackReceiver};

/// Service identifier both sides advertise and discover under.
pub const NEARBY_SERVICE_ID: &str = "mesh-transport";

/// Documented bytes-payload cap of the discovery service.
pub const NEARBY_MAX_PAYLOAD: usize = 32_768;

/// Synthetic signal strength for discovery sightings.
const DISCOVERY_RSSI: i16 = -50;
/// Synthetic signal strength reported for freshly connected endpoints.
const CONNECTED_RSSI: i16 = -45;

/// Nearby driver configuration.
#[derive(Debug, Clone)]
pub struct NearbyDriverConfig {
    /// Local endpoint name presented during advertising and connection
    /// requests.
    pub local_name: String,
    pub service_id: String,
}

impl Default for NearbyDriverConfig {
    fn default() -> Self {
        Self {
            local_name: "MeshNode".to_owned(),
            service_id: NEARBY_SERVICE_ID.to_owned(),
        }
    }
}

/// Driver adapter over one owned [`ConnectionsClient`].
///
/// The client is shared with the callback pump behind a mutex: the pump
/// must call back into the client to honor the always-accept policy.
pub struct NearbyDriver<C: ConnectionsClient + 'static> {
    client: Arc<Mutex<C>>,
    discovered: Arc<std::sync::Mutex<HashSet<PeerId>>>,
    discovering: bool,
    advertising: bool,
    config: NearbyDriverConfig,
}

impl<C: ConnectionsClient + 'static> NearbyDriver<C> {
    pub fn new(
        client: C,
        callbacks: NearbyCallbackReceiver,
        events: DriverEventSender,
        config: NearbyDriverConfig,
    ) -> Self {
        let client = Arc::new(Mutex::new(client));
        let discovered = Arc::new(std::sync::Mutex::new(HashSet::new()));
        tokio::spawn(pump(
            callbacks,
            events,
            Arc::clone(&client),
            Arc::clone(&discovered),
        ));
        Self {
            client,
            discovered,
            discovering: false,
            advertising: false,
            config,
        }
    }
}

/// Translate service callbacks into driver events, auto-accepting every
/// initiated connection.
async fn pump<C: ConnectionsClient>(
    mut callbacks: NearbyCallbackReceiver,
    events: DriverEventSender,
    client: Arc<Mutex<C>>,
    discovered: Arc<std::sync::Mutex<HashSet<PeerId>>>,
) {
    // endpoint -> whether the handshake was initiated by the remote side
    let mut pending_inbound: HashMap<String, bool> = HashMap::new();

    while let Some(callback) = callbacks.recv().await {
        match callback {
            NearbyCallback::EndpointFound { id, name } => {
                let peer = PeerId::new(id.clone());
                if let Ok(mut set) = discovered.lock() {
                    set.insert(peer.clone());
                }
                let event = DriverEvent::PeerSighted {
                    kind: TransportKind::Nearby,
                    id: peer,
                    name,
                    address: None,
                    rssi: Some(DISCOVERY_RSSI),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            NearbyCallback::EndpointLost { id } => {
                // The platform layer ignores endpoint-lost; staleness is the
                // coordinator's policy.
                debug!(endpoint = %id, "endpoint lost (ignored)");
            }
            NearbyCallback::ConnectionInitiated { id, inbound } => {
                pending_inbound.insert(id.clone(), inbound);
                let accepted = client.lock().await.accept_connection(&id).await;
                if let Err(err) = accepted {
                    warn!(endpoint = %id, %err, "accepting connection failed");
                    let event = DriverEvent::NativeFailure {
                        kind: TransportKind::Nearby,
                        operation: CommandKind::Connect,
                        reason: err.to_string(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
            NearbyCallback::ConnectionResolved { id, success } => {
                let inbound = pending_inbound.remove(&id).unwrap_or(false);
                let peer = PeerId::new(id.clone());
                if success && inbound {
                    // Inbound endpoints were never discovered locally; report
                    // a sighting so the peer exists before its connection
                    // result.
                    if let Ok(mut set) = discovered.lock() {
                        set.insert(peer.clone());
                    }
                    let sighting = DriverEvent::PeerSighted {
                        kind: TransportKind::Nearby,
                        id: peer.clone(),
                        name: id.clone(),
                        address: None,
                        rssi: Some(CONNECTED_RSSI),
                    };
                    if events.send(sighting).await.is_err() {
                        break;
                    }
                }
                let event = DriverEvent::ConnectionOutcome {
                    kind: TransportKind::Nearby,
                    id: peer,
                    success,
                    inbound,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            NearbyCallback::Disconnected { id } => {
                let event = DriverEvent::Disconnected {
                    kind: TransportKind::Nearby,
                    id: PeerId::new(id),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            NearbyCallback::PayloadReceived { id, data } => {
                let event = DriverEvent::PayloadArrived {
                    kind: TransportKind::Nearby,
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
impl<C: ConnectionsClient + 'static> Driver for NearbyDriver<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Nearby
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            kind: TransportKind::Nearby,
            max_payload: NEARBY_MAX_PAYLOAD,
            supports_connections: true,
            reports_peer_loss: false,
        }
    }

    async fn start_discovery(&mut self) -> Result<()> {
        if self.discovering {
            return Ok(());
        }
        self.client
            .lock()
            .await
            .start_discovery(&self.config.service_id)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Nearby, "startDiscovery"))?;
        self.discovering = true;
        debug!(service = %self.config.service_id, "discovery started");
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<()> {
        if !self.discovering {
            return Ok(());
        }
        self.client
            .lock()
            .await
            .stop_discovery()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Nearby, "stopDiscovery"))?;
        self.discovering = false;
        debug!("discovery stopped");
        Ok(())
    }

    async fn start_advertise(&mut self, name: &str) -> Result<()> {
        if self.advertising {
            return Ok(());
        }
        let name = if name.is_empty() {
            self.config.local_name.as_str()
        } else {
            name
        };
        self.client
            .lock()
            .await
            .start_advertising(name, &self.config.service_id)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Nearby, "advertise"))?;
        self.advertising = true;
        debug!(%name, "advertising started");
        Ok(())
    }

    async fn stop_advertise(&mut self) -> Result<()> {
        if !self.advertising {
            return Ok(());
        }
        self.client
            .lock()
            .await
            .stop_advertising()
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Nearby, "stopAdvertise"))?;
        self.advertising = false;
        debug!("advertising stopped");
        Ok(())
    }

    async fn connect(&mut self, peer: &PeerId) -> Result<()> {
        self.client
            .lock()
            .await
            .request_connection(&self.config.local_name, peer.as_str())
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Nearby, "connect"))?;
        debug!(endpoint = %peer, "connection requested");
        Ok(())
    }

    async fn send(&mut self, peer: &PeerId, data: Vec<u8>) -> Result<()> {
        self.client
            .lock()
            .await
            .send_payload(peer.as_str(), data)
            .await
            .map_err(|e| e.into_mesh_error(TransportKind::Nearby, "send"))?;
        Ok(())
    }

    fn known_peers(&self) -> SmallVec<[PeerId; 8]> {
        self.discovered
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
    use crate::client::NearbyCallbackSender;
    use meshlink_core::driver::DriverEventReceiver;
    use meshlink_core::NativeError;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeClient {
        calls: Arc<StdMutex<Vec<String>>>,
        fail_with: Option<NativeError>,
    }

    impl FakeClient {
        fn record(&self, call: String) -> std::result::Result<(), NativeError> {
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ConnectionsClient for FakeClient {
        async fn start_discovery(&mut self, service_id: &str) -> std::result::Result<(), NativeError> {
            self.record(format!("discover:{service_id}"))
        }
        async fn stop_discovery(&mut self) -> std::result::Result<(), NativeError> {
            self.record("stop_discover".into())
        }
        async fn start_advertising(
            &mut self,
            name: &str,
            service_id: &str,
        ) -> std::result::Result<(), NativeError> {
            self.record(format!("advertise:{name}:{service_id}"))
        }
        async fn stop_advertising(&mut self) -> std::result::Result<(), NativeError> {
            self.record("stop_advertise".into())
        }
        async fn request_connection(
            &mut self,
            local_name: &str,
            endpoint: &str,
        ) -> std::result::Result<(), NativeError> {
            self.record(format!("request:{local_name}:{endpoint}"))
        }
        async fn accept_connection(&mut self, endpoint: &str) -> std::result::Result<(), NativeError> {
            self.record(format!("accept:{endpoint}"))
        }
        async fn send_payload(
            &mut self,
            endpoint: &str,
            data: Vec<u8>,
        ) -> std::result::Result<(), NativeError> {
            self.record(format!("send:{endpoint}:{}", data.len()))
        }
        async fn disconnect(&mut self, endpoint: &str) -> std::result::Result<(), NativeError> {
            self.record(format!("disconnect:{endpoint}"))
        }
    }

    fn build_driver() -> (
        NearbyDriver<FakeClient>,
        NearbyCallbackSender,
        DriverEventReceiver,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let client = FakeClient::default();
        let calls = Arc::clone(&client.calls);
        let (cb_tx, cb_rx) = mpsc::channel(16);
        let (ev_tx, ev_rx) = mpsc::channel(16);
        let driver = NearbyDriver::new(client, cb_rx, ev_tx, NearbyDriverConfig::default());
        (driver, cb_tx, ev_rx, calls)
    }

    #[tokio::test]
    async fn endpoint_found_translates_with_synthetic_rssi() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(NearbyCallback::EndpointFound {
            id: "ep-1".into(),
            name: "Alice".into(),
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::PeerSighted { id, name, rssi, .. } => {
                assert_eq!(id.as_str(), "ep-1");
                assert_eq!(name, "Alice");
                assert_eq!(rssi, Some(DISCOVERY_RSSI));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn initiated_connections_are_auto_accepted() {
        let (_driver, cb, mut ev, calls) = build_driver();
        cb.send(NearbyCallback::ConnectionInitiated {
            id: "ep-2".into(),
            inbound: true,
        })
        .await
        .unwrap();
        cb.send(NearbyCallback::ConnectionResolved {
            id: "ep-2".into(),
            success: true,
        })
        .await
        .unwrap();

        // Inbound connect produces a sighting first, then the outcome.
        match ev.recv().await.unwrap() {
            DriverEvent::PeerSighted { id, rssi, .. } => {
                assert_eq!(id.as_str(), "ep-2");
                assert_eq!(rssi, Some(CONNECTED_RSSI));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome {
                id,
                success,
                inbound,
                ..
            } => {
                assert_eq!(id.as_str(), "ep-2");
                assert!(success);
                assert!(inbound);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(calls.lock().unwrap().contains(&"accept:ep-2".to_string()));
    }

    #[tokio::test]
    async fn outbound_resolution_emits_outcome_only() {
        let (mut driver, cb, mut ev, calls) = build_driver();
        driver.connect(&PeerId::new("ep-3")).await.unwrap();

        cb.send(NearbyCallback::ConnectionInitiated {
            id: "ep-3".into(),
            inbound: false,
        })
        .await
        .unwrap();
        cb.send(NearbyCallback::ConnectionResolved {
            id: "ep-3".into(),
            success: true,
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome {
                id,
                success,
                inbound,
                ..
            } => {
                assert_eq!(id.as_str(), "ep-3");
                assert!(success);
                assert!(!inbound);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let calls = calls.lock().unwrap();
        assert!(calls.iter().any(|c| c.starts_with("request:MeshNode:ep-3")));
    }

    #[tokio::test]
    async fn endpoint_lost_is_ignored() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(NearbyCallback::EndpointLost { id: "ep-4".into() })
            .await
            .unwrap();
        cb.send(NearbyCallback::PayloadReceived {
            id: "ep-5".into(),
            data: vec![9],
        })
        .await
        .unwrap();

        // The next event is the payload; no PeerVanished was produced.
        match ev.recv().await.unwrap() {
            DriverEvent::PayloadArrived { from, data, .. } => {
                assert_eq!(from.as_str(), "ep-5");
                assert_eq!(data, vec![9]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_resolution_reports_unsuccessful_outcome() {
        let (_driver, cb, mut ev, _calls) = build_driver();
        cb.send(NearbyCallback::ConnectionInitiated {
            id: "ep-6".into(),
            inbound: false,
        })
        .await
        .unwrap();
        cb.send(NearbyCallback::ConnectionResolved {
            id: "ep-6".into(),
            success: false,
        })
        .await
        .unwrap();

        match ev.recv().await.unwrap() {
            DriverEvent::ConnectionOutcome { success, .. } => assert!(!success),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_discovery_is_idempotent() {
        let (mut driver, _cb, _ev, calls) = build_driver();
        driver.start_discovery().await.unwrap();
        driver.start_discovery().await.unwrap();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &["discover:mesh-transport".to_string()]
        );
    }
}
