//! Per-driver peer registry.
//!
//! One registry instance exists per driver; peers discovered on different
//! transports are never merged. All mutation happens on the coordinator task,
//! so the map itself needs no interior locking; linearizability falls out of
//! the single-consumer event loop.

use std::collections::HashMap;
use std::time::Duration;

use crate::peer::{ConnectionState, Peer};
use crate::types::{PeerId, Timestamp, TransportKind};

/// Single source of truth mapping peer identifier to peer record for one
/// driver instance.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Insert a peer on first sighting, or refresh discovery fields of an
    /// existing record. Returns `true` if the peer was newly inserted.
    pub fn upsert(
        &mut self,
        id: PeerId,
        kind: TransportKind,
        name: &str,
        address: Option<&str>,
        rssi: Option<i16>,
    ) -> bool {
        let seen = Timestamp::now();
        match self.peers.get_mut(&id) {
            Some(existing) => {
                existing.refresh(name, address, rssi, seen);
                false
            }
            None => {
                let mut peer = Peer::new(id.clone(), kind, name);
                if let Some(address) = address {
                    peer.address = Some(address.to_owned());
                }
                peer.rssi = rssi;
                peer.last_seen = seen;
                self.peers.insert(id, peer);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<Peer> {
        self.peers.remove(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Snapshot of all known peers. Insertion order is not meaningful.
    pub fn all(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Evict peers not seen within `max_age`, skipping any with a pending or
    /// established connection. Returns the evicted identifiers.
    ///
    /// This is the coordinator-level staleness policy: two of the three
    /// native services never report peer loss, so idle records would
    /// otherwise accumulate forever.
    pub fn evict_stale(&mut self, max_age: Duration, now: Timestamp) -> Vec<PeerId> {
        let stale: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.state == ConnectionState::None)
            .filter(|p| now.duration_since(p.last_seen) > max_age)
            .map(|p| p.id.clone())
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(id: &str) -> PeerRegistry {
        let mut r = PeerRegistry::new();
        r.upsert(PeerId::new(id), TransportKind::Ble, "X", Some("AA:BB"), Some(-50));
        r
    }

    #[test]
    fn upsert_inserts_then_refreshes() {
        let mut r = PeerRegistry::new();
        let id = PeerId::new("p1");

        assert!(r.upsert(id.clone(), TransportKind::Ble, "X", None, Some(-60)));
        assert!(!r.upsert(id.clone(), TransportKind::Ble, "Y", None, Some(-40)));

        let peer = r.get(&id).unwrap();
        assert_eq!(peer.name, "Y");
        assert_eq!(peer.rssi, Some(-40));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn remove_returns_record() {
        let mut r = registry_with("p1");
        let removed = r.remove(&PeerId::new("p1")).unwrap();
        assert_eq!(removed.id.as_str(), "p1");
        assert!(r.is_empty());
    }

    #[test]
    fn evict_stale_skips_connected_and_connecting() {
        let mut r = PeerRegistry::new();
        for id in ["idle", "busy", "pending"] {
            r.upsert(PeerId::new(id), TransportKind::Nearby, id, None, None);
        }
        r.get_mut(&PeerId::new("busy"))
            .unwrap()
            .mark_connected(crate::peer::ConnectionDirection::Outbound);
        r.get_mut(&PeerId::new("pending")).unwrap().mark_connecting();

        // Age everything far past the cutoff.
        let future = Timestamp::new(Timestamp::now().as_millis() + 600_000);
        let evicted = r.evict_stale(Duration::from_secs(120), future);

        assert_eq!(evicted, vec![PeerId::new("idle")]);
        assert!(r.contains(&PeerId::new("busy")));
        assert!(r.contains(&PeerId::new("pending")));
    }

    #[test]
    fn evict_stale_keeps_recent_peers() {
        let mut r = registry_with("p1");
        let evicted = r.evict_stale(Duration::from_secs(120), Timestamp::now());
        assert!(evicted.is_empty());
        assert_eq!(r.len(), 1);
    }
}
