//! Peer records and per-connection state.

use serde::{Deserialize, Serialize};

use crate::types::{PeerId, Timestamp, TransportKind};

// ----------------------------------------------------------------------------
// Connection State Machine
// ----------------------------------------------------------------------------

/// Connection state of a peer on its owning driver.
///
/// Connectionless transports (BLE broadcast) only ever use `None` and
/// `Connected`; the handshake transports walk the full machine:
///
/// ```text
/// None --connect()--> Connecting --native resolve ok--> Connected
/// Connecting --native failure/reject--> None
/// Connected  --native disconnect------> None
/// ```
///
/// Inbound invitations are auto-accepted and jump straight from `None` to
/// `Connected` with no visible `Connecting` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    None,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }
}

/// Who initiated the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionDirection {
    Outbound,
    Inbound,
}

// ----------------------------------------------------------------------------
// Peer Record
// ----------------------------------------------------------------------------

/// A discovered or connected remote endpoint, scoped to one driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Transport-scoped opaque identifier.
    pub id: PeerId,
    /// Driver that reported this peer.
    pub kind: TransportKind,
    /// Human-readable name as the transport reports it.
    pub name: String,
    /// Physical address, where the transport exposes one (BLE only).
    pub address: Option<String>,
    /// Signal-strength estimate; synthetic on transports without a radio
    /// measurement.
    pub rssi: Option<i16>,
    /// When the owning driver last reported this peer.
    pub last_seen: Timestamp,
    /// Connection state on the owning driver.
    pub state: ConnectionState,
    /// Direction of the active or pending connection, if any.
    pub direction: Option<ConnectionDirection>,
}

impl Peer {
    pub fn new(id: PeerId, kind: TransportKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            address: None,
            rssi: None,
            last_seen: Timestamp::now(),
            state: ConnectionState::None,
            direction: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Refresh discovery fields from a newer sighting. Last writer wins,
    /// in callback arrival order.
    pub fn refresh(&mut self, name: &str, address: Option<&str>, rssi: Option<i16>, seen: Timestamp) {
        if !name.is_empty() {
            self.name = name.to_owned();
        }
        if let Some(address) = address {
            self.address = Some(address.to_owned());
        }
        if rssi.is_some() {
            self.rssi = rssi;
        }
        self.last_seen = seen;
    }

    /// Mark an outbound connection attempt as started.
    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.direction = Some(ConnectionDirection::Outbound);
    }

    /// Mark the connection as established.
    pub fn mark_connected(&mut self, direction: ConnectionDirection) {
        self.state = ConnectionState::Connected;
        self.direction = Some(direction);
    }

    /// Return to the unconnected state after failure or disconnect.
    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::None;
        self.direction = None;
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Peer {
        Peer::new(PeerId::new("peer-1"), TransportKind::Nearby, "Alice")
    }

    #[test]
    fn outbound_connect_walks_full_machine() {
        let mut p = peer();
        assert_eq!(p.state, ConnectionState::None);

        p.mark_connecting();
        assert_eq!(p.state, ConnectionState::Connecting);
        assert_eq!(p.direction, Some(ConnectionDirection::Outbound));

        p.mark_connected(ConnectionDirection::Outbound);
        assert!(p.is_connected());

        p.mark_disconnected();
        assert_eq!(p.state, ConnectionState::None);
        assert_eq!(p.direction, None);
    }

    #[test]
    fn inbound_accept_skips_connecting() {
        let mut p = peer();
        p.mark_connected(ConnectionDirection::Inbound);
        assert!(p.is_connected());
        assert_eq!(p.direction, Some(ConnectionDirection::Inbound));
    }

    #[test]
    fn refresh_keeps_existing_fields_when_update_is_empty() {
        let mut p = peer().with_address("AA:BB").with_rssi(-50);
        let before = p.last_seen;
        p.refresh("", None, None, Timestamp::new(before.as_millis() + 100));

        assert_eq!(p.name, "Alice");
        assert_eq!(p.address.as_deref(), Some("AA:BB"));
        assert_eq!(p.rssi, Some(-50));
        assert!(p.last_seen > before);
    }

    #[test]
    fn refresh_overwrites_with_newer_values() {
        let mut p = peer();
        p.refresh("Alice's Phone", Some("CC:DD"), Some(-42), Timestamp::now());
        assert_eq!(p.name, "Alice's Phone");
        assert_eq!(p.address.as_deref(), Some("CC:DD"));
        assert_eq!(p.rssi, Some(-42));
    }
}
