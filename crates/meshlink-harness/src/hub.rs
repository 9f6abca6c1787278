//! Shared endpoint-discovery fabric with the two-sided connection handshake.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use meshlink_core::NativeError;
use meshlink_nearby::{ConnectionsClient, NearbyCallback, NearbyCallbackReceiver, NearbyCallbackSender};

const CALLBACK_BUFFER: usize = 64;

#[derive(Default)]
struct HubState {
    endpoints: HashMap<String, EndpointSlot>,
}

struct EndpointSlot {
    callbacks: NearbyCallbackSender,
    discovering: Option<String>,
    advertising: Option<(String, String)>,
    /// Remote endpoints this one has accepted.
    accepted: HashSet<String>,
    connected: HashSet<String>,
}

type Delivery = (NearbyCallbackSender, NearbyCallback);

/// One shared discovery service. Endpoint IDs are generated, not chosen.
#[derive(Clone, Default)]
pub struct NearbyHub {
    state: Arc<Mutex<HubState>>,
}

impl NearbyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new endpoint. Returns the client, its callback stream, and
    /// the generated endpoint ID the other side will see.
    pub fn join(&self) -> (HubEndpoint, NearbyCallbackReceiver, String) {
        let id = Uuid::new_v4().simple().to_string()[..8].to_owned();
        let (tx, rx) = mpsc::channel(CALLBACK_BUFFER);
        if let Ok(mut state) = self.state.lock() {
            state.endpoints.insert(
                id.clone(),
                EndpointSlot {
                    callbacks: tx,
                    discovering: None,
                    advertising: None,
                    accepted: HashSet::new(),
                    connected: HashSet::new(),
                },
            );
        }
        let endpoint = HubEndpoint {
            id: id.clone(),
            state: Arc::clone(&self.state),
        };
        (endpoint, rx, id)
    }
}

/// One endpoint participating in a [`NearbyHub`].
pub struct HubEndpoint {
    id: String,
    state: Arc<Mutex<HubState>>,
}

impl HubEndpoint {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HubState>, NativeError> {
        self.state
            .lock()
            .map_err(|_| NativeError::Failure("hub poisoned".into()))
    }

    async fn deliver(deliveries: Vec<Delivery>) {
        for (tx, callback) in deliveries {
            let _ = tx.send(callback).await;
        }
    }
}

#[async_trait]
impl ConnectionsClient for HubEndpoint {
    async fn start_discovery(&mut self, service_id: &str) -> Result<(), NativeError> {
        let deliveries = {
            let mut state = self.lock()?;
            let me = state
                .endpoints
                .get(&self.id)
                .ok_or_else(|| NativeError::Failure("endpoint gone".into()))?
                .callbacks
                .clone();
            if let Some(slot) = state.endpoints.get_mut(&self.id) {
                slot.discovering = Some(service_id.to_owned());
            }
            // Existing advertisers under the same service are found at once.
            state
                .endpoints
                .iter()
                .filter(|(id, _)| *id != &self.id)
                .filter_map(|(id, slot)| {
                    slot.advertising.as_ref().and_then(|(name, service)| {
                        (service.as_str() == service_id).then(|| {
                            (
                                me.clone(),
                                NearbyCallback::EndpointFound {
                                    id: id.clone(),
                                    name: name.clone(),
                                },
                            )
                        })
                    })
                })
                .collect()
        };
        Self::deliver(deliveries).await;
        debug!(endpoint = %self.id, service = %service_id, "hub discovery on");
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<(), NativeError> {
        let mut state = self.lock()?;
        if let Some(slot) = state.endpoints.get_mut(&self.id) {
            slot.discovering = None;
        }
        Ok(())
    }

    async fn start_advertising(
        &mut self,
        name: &str,
        service_id: &str,
    ) -> Result<(), NativeError> {
        let deliveries: Vec<Delivery> = {
            let mut state = self.lock()?;
            if let Some(slot) = state.endpoints.get_mut(&self.id) {
                slot.advertising = Some((name.to_owned(), service_id.to_owned()));
            }
            state
                .endpoints
                .iter()
                .filter(|(id, _)| *id != &self.id)
                .filter(|(_, slot)| slot.discovering.as_deref() == Some(service_id))
                .map(|(_, slot)| {
                    (
                        slot.callbacks.clone(),
                        NearbyCallback::EndpointFound {
                            id: self.id.clone(),
                            name: name.to_owned(),
                        },
                    )
                })
                .collect()
        };
        Self::deliver(deliveries).await;
        debug!(endpoint = %self.id, %name, "hub advertising on");
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), NativeError> {
        let mut state = self.lock()?;
        if let Some(slot) = state.endpoints.get_mut(&self.id) {
            slot.advertising = None;
        }
        Ok(())
    }

    async fn request_connection(
        &mut self,
        _local_name: &str,
        endpoint: &str,
    ) -> Result<(), NativeError> {
        let deliveries = {
            let state = self.lock()?;
            let me = state
                .endpoints
                .get(&self.id)
                .ok_or_else(|| NativeError::Failure("endpoint gone".into()))?;
            let remote = state
                .endpoints
                .get(endpoint)
                .ok_or_else(|| NativeError::Failure(format!("unknown endpoint {endpoint}")))?;
            vec![
                (
                    me.callbacks.clone(),
                    NearbyCallback::ConnectionInitiated {
                        id: endpoint.to_owned(),
                        inbound: false,
                    },
                ),
                (
                    remote.callbacks.clone(),
                    NearbyCallback::ConnectionInitiated {
                        id: self.id.clone(),
                        inbound: true,
                    },
                ),
            ]
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn accept_connection(&mut self, endpoint: &str) -> Result<(), NativeError> {
        let deliveries = {
            let mut state = self.lock()?;
            if !state.endpoints.contains_key(endpoint) {
                return Err(NativeError::Failure(format!("unknown endpoint {endpoint}")));
            }
            if let Some(slot) = state.endpoints.get_mut(&self.id) {
                slot.accepted.insert(endpoint.to_owned());
            }
            let mutual = state
                .endpoints
                .get(endpoint)
                .map(|slot| slot.accepted.contains(&self.id))
                .unwrap_or(false);
            if mutual {
                // Both sides answered; the handshake resolves for both.
                let mut deliveries = Vec::new();
                if let Some(slot) = state.endpoints.get_mut(&self.id) {
                    slot.connected.insert(endpoint.to_owned());
                    deliveries.push((
                        slot.callbacks.clone(),
                        NearbyCallback::ConnectionResolved {
                            id: endpoint.to_owned(),
                            success: true,
                        },
                    ));
                }
                if let Some(slot) = state.endpoints.get_mut(endpoint) {
                    slot.connected.insert(self.id.clone());
                    deliveries.push((
                        slot.callbacks.clone(),
                        NearbyCallback::ConnectionResolved {
                            id: self.id.clone(),
                            success: true,
                        },
                    ));
                }
                deliveries
            } else {
                Vec::new()
            }
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn send_payload(&mut self, endpoint: &str, data: Vec<u8>) -> Result<(), NativeError> {
        let delivery = {
            let state = self.lock()?;
            let connected = state
                .endpoints
                .get(&self.id)
                .map(|slot| slot.connected.contains(endpoint))
                .unwrap_or(false);
            if !connected {
                return Err(NativeError::Failure(format!("not connected to {endpoint}")));
            }
            state
                .endpoints
                .get(endpoint)
                .map(|slot| {
                    (
                        slot.callbacks.clone(),
                        NearbyCallback::PayloadReceived {
                            id: self.id.clone(),
                            data,
                        },
                    )
                })
                .ok_or_else(|| NativeError::Failure(format!("unknown endpoint {endpoint}")))?
        };
        Self::deliver(vec![delivery]).await;
        Ok(())
    }

    async fn disconnect(&mut self, endpoint: &str) -> Result<(), NativeError> {
        let deliveries = {
            let mut state = self.lock()?;
            let mut deliveries = Vec::new();
            if let Some(slot) = state.endpoints.get_mut(&self.id) {
                if slot.connected.remove(endpoint) {
                    slot.accepted.remove(endpoint);
                    deliveries.push((
                        slot.callbacks.clone(),
                        NearbyCallback::Disconnected {
                            id: endpoint.to_owned(),
                        },
                    ));
                }
            }
            if let Some(slot) = state.endpoints.get_mut(endpoint) {
                if slot.connected.remove(&self.id) {
                    slot.accepted.remove(&self.id);
                    deliveries.push((
                        slot.callbacks.clone(),
                        NearbyCallback::Disconnected {
                            id: self.id.clone(),
                        },
                    ));
                }
            }
            deliveries
        };
        Self::deliver(deliveries).await;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
