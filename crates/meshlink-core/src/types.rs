//! Fundamental identifier and time types.
//!
//! Newtype wrappers keep the transport-scoped identifiers from being mixed
//! up with ordinary strings at API boundaries.

use std::fmt;
use std::ops::Deref;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Opaque, transport-scoped identifier for a remote peer.
///
/// The underlying string depends on the owning driver: a MAC-style address
/// for BLE, an assigned endpoint ID for the discovery service, a display
/// name for multicast sessions. Identifiers are never compared across
/// transports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Deref for PeerId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Transport Kind
// ----------------------------------------------------------------------------

/// Identifies which driver a peer, connection, or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Bluetooth Low Energy advertise/scan (connectionless broadcast).
    Ble,
    /// Connection-oriented endpoint discovery service.
    Nearby,
    /// Session-oriented multicast service.
    Multipeer,
}

impl TransportKind {
    /// All kinds, in coordinator routing order.
    pub const ALL: [TransportKind; 3] = [
        TransportKind::Ble,
        TransportKind::Nearby,
        TransportKind::Multipeer,
    ];
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ble => write!(f, "BLE"),
            TransportKind::Nearby => write!(f, "Nearby"),
            TransportKind::Multipeer => write!(f, "Multipeer"),
        }
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Duration since an earlier timestamp; saturates at zero.
    pub fn duration_since(&self, other: Self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display_roundtrip() {
        let id = PeerId::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(format!("{id}"), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn transport_kind_display() {
        assert_eq!(format!("{}", TransportKind::Ble), "BLE");
        assert_eq!(format!("{}", TransportKind::Nearby), "Nearby");
        assert_eq!(format!("{}", TransportKind::Multipeer), "Multipeer");
    }

    #[test]
    fn timestamp_duration_since_saturates() {
        let earlier = Timestamp::new(1_000);
        let later = Timestamp::new(4_500);
        assert_eq!(later.duration_since(earlier).as_millis(), 3_500);
        assert_eq!(earlier.duration_since(later).as_millis(), 0);
    }
}
