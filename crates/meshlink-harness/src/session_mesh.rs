//! Shared multicast-session fabric keyed by display name.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use meshlink_core::NativeError;
use meshlink_multipeer::{
    SessionCallback, SessionCallbackReceiver, SessionCallbackSender, SessionHost, SessionState,
};

const CALLBACK_BUFFER: usize = 64;

#[derive(Default)]
struct MeshState {
    members: HashMap<String, MemberSlot>,
}

struct MemberSlot {
    callbacks: SessionCallbackSender,
    browsing: bool,
    advertising: bool,
    connected: HashSet<String>,
}

type Delivery = (SessionCallbackSender, SessionCallback);

/// One shared session fabric; members are identified by display name.
#[derive(Clone, Default)]
pub struct SessionMesh {
    state: Arc<Mutex<MeshState>>,
}

impl SessionMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member under `display_name`.
    pub fn join(&self, display_name: impl Into<String>) -> (MeshMember, SessionCallbackReceiver) {
        let name = display_name.into();
        let (tx, rx) = mpsc::channel(CALLBACK_BUFFER);
        if let Ok(mut state) = self.state.lock() {
            state.members.insert(
                name.clone(),
                MemberSlot {
                    callbacks: tx,
                    browsing: false,
                    advertising: false,
                    connected: HashSet::new(),
                },
            );
        }
        let member = MeshMember {
            name,
            state: Arc::clone(&self.state),
        };
        (member, rx)
    }
}

/// One member of a [`SessionMesh`].
pub struct MeshMember {
    name: String,
    state: Arc<Mutex<MeshState>>,
}

impl MeshMember {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MeshState>, NativeError> {
        self.state
            .lock()
            .map_err(|_| NativeError::Failure("session mesh poisoned".into()))
    }

    async fn deliver(deliveries: Vec<Delivery>) {
        for (tx, callback) in deliveries {
            let _ = tx.send(callback).await;
        }
    }
}

#[async_trait]
impl SessionHost for MeshMember {
    async fn start_browsing(&mut self) -> Result<(), NativeError> {
        let deliveries = {
            let mut state = self.lock()?;
            let me = state
                .members
                .get(&self.name)
                .ok_or_else(|| NativeError::Failure("member gone".into()))?
                .callbacks
                .clone();
            if let Some(slot) = state.members.get_mut(&self.name) {
                slot.browsing = true;
            }
            state
                .members
                .iter()
                .filter(|(name, slot)| *name != &self.name && slot.advertising)
                .map(|(name, _)| {
                    (
                        me.clone(),
                        SessionCallback::PeerFound { id: name.clone() },
                    )
                })
                .collect::<Vec<Delivery>>()
        };
        Self::deliver(deliveries).await;
        debug!(member = %self.name, "mesh browsing on");
        Ok(())
    }

    async fn stop_browsing(&mut self) -> Result<(), NativeError> {
        let mut state = self.lock()?;
        if let Some(slot) = state.members.get_mut(&self.name) {
            slot.browsing = false;
        }
        Ok(())
    }

    async fn start_advertising(&mut self, _name: &str) -> Result<(), NativeError> {
        let deliveries: Vec<Delivery> = {
            let mut state = self.lock()?;
            if let Some(slot) = state.members.get_mut(&self.name) {
                slot.advertising = true;
            }
            state
                .members
                .iter()
                .filter(|(name, slot)| *name != &self.name && slot.browsing)
                .map(|(_, slot)| {
                    (
                        slot.callbacks.clone(),
                        SessionCallback::PeerFound {
                            id: self.name.clone(),
                        },
                    )
                })
                .collect()
        };
        Self::deliver(deliveries).await;
        debug!(member = %self.name, "mesh advertising on");
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), NativeError> {
        let deliveries: Vec<Delivery> = {
            let mut state = self.lock()?;
            if let Some(slot) = state.members.get_mut(&self.name) {
                slot.advertising = false;
            }
            // Browsers get the native lost-peer callback; the driver layer
            // above ignores it.
            state
                .members
                .iter()
                .filter(|(name, slot)| *name != &self.name && slot.browsing)
                .map(|(_, slot)| {
                    (
                        slot.callbacks.clone(),
                        SessionCallback::PeerLost {
                            id: self.name.clone(),
                        },
                    )
                })
                .collect()
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn invite(&mut self, peer: &str, _timeout: Duration) -> Result<(), NativeError> {
        let deliveries = {
            let state = self.lock()?;
            let me = state
                .members
                .get(&self.name)
                .ok_or_else(|| NativeError::Failure("member gone".into()))?;
            let remote = state
                .members
                .get(peer)
                .ok_or_else(|| NativeError::Failure(format!("unknown peer {peer}")))?;
            vec![
                (
                    me.callbacks.clone(),
                    SessionCallback::StateChanged {
                        id: peer.to_owned(),
                        state: SessionState::Connecting,
                    },
                ),
                (
                    remote.callbacks.clone(),
                    SessionCallback::InvitationReceived {
                        id: self.name.clone(),
                    },
                ),
            ]
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn accept_invitation(&mut self, peer: &str) -> Result<(), NativeError> {
        let deliveries = {
            let mut state = self.lock()?;
            if !state.members.contains_key(peer) {
                return Err(NativeError::Failure(format!("unknown peer {peer}")));
            }
            let mut deliveries = Vec::new();
            if let Some(slot) = state.members.get_mut(&self.name) {
                slot.connected.insert(peer.to_owned());
                deliveries.push((
                    slot.callbacks.clone(),
                    SessionCallback::StateChanged {
                        id: peer.to_owned(),
                        state: SessionState::Connected,
                    },
                ));
            }
            if let Some(slot) = state.members.get_mut(peer) {
                slot.connected.insert(self.name.clone());
                deliveries.push((
                    slot.callbacks.clone(),
                    SessionCallback::StateChanged {
                        id: self.name.clone(),
                        state: SessionState::Connected,
                    },
                ));
            }
            deliveries
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn send(&mut self, peer: &str, data: Vec<u8>) -> Result<(), NativeError> {
        let delivery = {
            let state = self.lock()?;
            let connected = state
                .members
                .get(&self.name)
                .map(|slot| slot.connected.contains(peer))
                .unwrap_or(false);
            if !connected {
                return Err(NativeError::Failure(format!("not connected to {peer}")));
            }
            state
                .members
                .get(peer)
                .map(|slot| {
                    (
                        slot.callbacks.clone(),
                        SessionCallback::DataReceived {
                            id: self.name.clone(),
                            data,
                        },
                    )
                })
                .ok_or_else(|| NativeError::Failure(format!("unknown peer {peer}")))?
        };
        Self::deliver(vec![delivery]).await;
        Ok(())
    }

    async fn disconnect(&mut self, peer: &str) -> Result<(), NativeError> {
        let deliveries = {
            let mut state = self.lock()?;
            let mut deliveries = Vec::new();
            if let Some(slot) = state.members.get_mut(&self.name) {
                if slot.connected.remove(peer) {
                    deliveries.push((
                        slot.callbacks.clone(),
                        SessionCallback::StateChanged {
                            id: peer.to_owned(),
                            state: SessionState::NotConnected,
                        },
                    ));
                }
            }
            if let Some(slot) = state.members.get_mut(peer) {
                if slot.connected.remove(&self.name) {
                    deliveries.push((
                        slot.callbacks.clone(),
                        SessionCallback::StateChanged {
                            id: self.name.clone(),
                            state: SessionState::NotConnected,
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
