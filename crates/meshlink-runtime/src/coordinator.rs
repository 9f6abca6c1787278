//! The coordinator task.
//!
//! One task owns every driver and its registry, consuming application
//! requests and driver events from two channels in a single `select!` loop.
//! Ordering on the event sink follows processing order here, which for any
//! single peer matches the order its driver raised the underlying callbacks.

use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use meshlink_core::driver::{
    Driver, DriverCapabilities, DriverEvent, DriverEventReceiver, DriverEventSender,
};
use meshlink_core::{
    Command, ConnectionDirection, Event, MeshConfig, MeshError, Peer, PeerId, PeerRegistry, Result,
    Timestamp, TransportKind,
};

use crate::channels::{Request, RequestReceiver};

// ----------------------------------------------------------------------------
// Driver Slot
// ----------------------------------------------------------------------------

/// One registered driver with its private registry.
struct DriverSlot {
    driver: Box<dyn Driver>,
    caps: DriverCapabilities,
    registry: PeerRegistry,
}

// ----------------------------------------------------------------------------
// Coordinator
// ----------------------------------------------------------------------------

/// Single owner of all transport state.
pub struct Coordinator {
    config: MeshConfig,
    slots: Vec<DriverSlot>,
    requests: RequestReceiver,
    driver_events: DriverEventReceiver,
    // Keeps the fan-in open even when no driver retains a sender clone, so
    // the loop only ends on shutdown or request-channel closure.
    _driver_tx: DriverEventSender,
    events: mpsc::Sender<Event>,
}

impl Coordinator {
    pub(crate) fn new(
        config: MeshConfig,
        drivers: Vec<Box<dyn Driver>>,
        requests: RequestReceiver,
        driver_events: DriverEventReceiver,
        driver_tx: DriverEventSender,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let slots = drivers
            .into_iter()
            .map(|driver| DriverSlot {
                caps: driver.capabilities(),
                registry: PeerRegistry::new(),
                driver,
            })
            .collect();
        Self {
            config,
            slots,
            requests,
            driver_events,
            _driver_tx: driver_tx,
            events,
        }
    }

    /// Run until shutdown is requested or both input channels close.
    pub async fn run(mut self) {
        let sweeping = self.config.staleness.enabled;
        let mut sweep = tokio::time::interval(if sweeping {
            self.config.staleness.sweep_interval
        } else {
            // Placeholder cadence; ticks are ignored when disabled.
            std::time::Duration::from_secs(3600)
        });
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(transports = self.slots.len(), "coordinator started");
        loop {
            select! {
                request = self.requests.recv() => {
                    match request {
                        Some(Request::Command { command, reply }) => {
                            let result = self.handle_command(command).await;
                            let _ = reply.send(result);
                        }
                        Some(Request::Peers { reply }) => {
                            let _ = reply.send(self.all_peers());
                        }
                        Some(Request::Shutdown) | None => break,
                    }
                }
                event = self.driver_events.recv() => {
                    match event {
                        Some(event) => self.handle_driver_event(event).await,
                        None => break,
                    }
                }
                _ = sweep.tick(), if sweeping => {
                    self.sweep_stale().await;
                }
            }
        }
        info!("coordinator stopped");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        debug!(command = %command.kind_of(), "handling command");
        match command {
            Command::StartDiscovery { kind } => {
                self.slot_mut(kind)?.driver.start_discovery().await
            }
            Command::StopDiscovery { kind } => self.slot_mut(kind)?.driver.stop_discovery().await,
            Command::StartAdvertise { kind, name } => {
                self.slot_mut(kind)?.driver.start_advertise(&name).await
            }
            Command::StopAdvertise { kind } => self.slot_mut(kind)?.driver.stop_advertise().await,
            Command::Connect { peer_id } => self.handle_connect(peer_id).await,
            Command::Send { peer_id, data } => self.handle_send(peer_id, data).await,
        }
    }

    /// Peer identifiers are transport-scoped, so the owning driver is the
    /// one whose registry knows the peer.
    async fn handle_connect(&mut self, peer_id: PeerId) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.registry.contains(&peer_id))
            .ok_or_else(|| MeshError::UnknownPeer(peer_id.clone()))?;

        if slot.caps.supports_connections {
            let peer = slot
                .registry
                .get_mut(&peer_id)
                .ok_or_else(|| MeshError::UnknownPeer(peer_id.clone()))?;
            if peer.is_connected() || peer.state.is_connecting() {
                // Idempotent: the attempt is already resolved or in flight.
                return Ok(());
            }
            peer.mark_connecting();
        }

        // No attempt timeout on purpose: the native layers time out
        // themselves and always report a terminal outcome.
        let result = slot.driver.connect(&peer_id).await;
        if result.is_err() {
            if let Some(peer) = slot.registry.get_mut(&peer_id) {
                peer.mark_disconnected();
            }
        }
        result
    }

    async fn handle_send(&mut self, peer_id: PeerId, data: Vec<u8>) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.registry.contains(&peer_id))
            .ok_or_else(|| MeshError::UnknownPeer(peer_id.clone()))?;

        if data.len() > slot.caps.max_payload {
            return Err(MeshError::PayloadTooLarge {
                kind: slot.caps.kind,
                size: data.len(),
                max: slot.caps.max_payload,
            });
        }

        if slot.caps.supports_connections {
            let connected = slot
                .registry
                .get(&peer_id)
                .map(Peer::is_connected)
                .unwrap_or(false);
            if !connected {
                return Err(MeshError::NotConnected(peer_id));
            }
        }

        slot.driver.send(&peer_id, data).await
    }

    // ------------------------------------------------------------------------
    // Driver Events
    // ------------------------------------------------------------------------

    async fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::PeerSighted {
                kind,
                id,
                name,
                address,
                rssi,
            } => {
                let Some(slot) = self.slot_of(kind) else {
                    return;
                };
                slot.registry
                    .upsert(id.clone(), kind, &name, address.as_deref(), rssi);
                if let Some(peer) = slot.registry.get(&id) {
                    let peer = peer.clone();
                    self.emit(Event::PeerFound { peer }).await;
                }
            }
            DriverEvent::PeerVanished { kind, id } => {
                let Some(slot) = self.slot_of(kind) else {
                    return;
                };
                if slot.registry.remove(&id).is_some() {
                    self.emit(Event::PeerLost { peer_id: id, kind }).await;
                }
            }
            DriverEvent::ConnectionOutcome {
                kind,
                id,
                success,
                inbound,
            } => {
                let Some(slot) = self.slot_of(kind) else {
                    return;
                };
                let Some(peer) = slot.registry.get_mut(&id) else {
                    warn!(peer = %id, %kind, "connection outcome for unknown peer");
                    return;
                };
                if success {
                    if peer.is_connected() {
                        // Duplicate resolve from the native layer.
                        debug!(peer = %id, "already connected, outcome suppressed");
                        return;
                    }
                    let direction = if inbound {
                        ConnectionDirection::Inbound
                    } else {
                        ConnectionDirection::Outbound
                    };
                    peer.mark_connected(direction);
                } else {
                    peer.mark_disconnected();
                }
                self.emit(Event::ConnectionResult {
                    peer_id: id,
                    kind,
                    success,
                })
                .await;
            }
            DriverEvent::Disconnected { kind, id } => {
                let Some(slot) = self.slot_of(kind) else {
                    return;
                };
                let was_connected = match slot.registry.get_mut(&id) {
                    Some(peer) => {
                        let was = peer.is_connected();
                        peer.mark_disconnected();
                        was
                    }
                    None => false,
                };
                if was_connected {
                    self.emit(Event::Disconnected { peer_id: id, kind }).await;
                }
            }
            DriverEvent::PayloadArrived { kind, from, data } => {
                self.emit(Event::MessageReceived {
                    peer_id: from,
                    kind,
                    data,
                })
                .await;
            }
            DriverEvent::NativeFailure {
                kind,
                operation,
                reason,
            } => {
                warn!(%kind, %operation, %reason, "native failure");
                self.emit(Event::OperationFailed {
                    command: operation,
                    kind,
                    reason,
                })
                .await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Staleness
    // ------------------------------------------------------------------------

    async fn sweep_stale(&mut self) {
        let max_age = self.config.staleness.max_age;
        let now = Timestamp::now();
        let mut evicted: Vec<(PeerId, TransportKind)> = Vec::new();
        for slot in &mut self.slots {
            for id in slot.registry.evict_stale(max_age, now) {
                evicted.push((id, slot.caps.kind));
            }
        }
        for (peer_id, kind) in evicted {
            debug!(peer = %peer_id, %kind, "peer evicted as stale");
            self.emit(Event::PeerLost { peer_id, kind }).await;
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn slot_mut(&mut self, kind: TransportKind) -> Result<&mut DriverSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.caps.kind == kind)
            .ok_or_else(|| MeshError::unavailable(kind, "no driver registered"))
    }

    fn slot_of(&mut self, kind: TransportKind) -> Option<&mut DriverSlot> {
        self.slots.iter_mut().find(|s| s.caps.kind == kind)
    }

    fn all_peers(&self) -> Vec<Peer> {
        self.slots.iter().flat_map(|s| s.registry.all()).collect()
    }

    async fn emit(&mut self, event: Event) {
        if self.events.send(event).await.is_err() {
            debug!("event sink dropped");
        }
    }
}
