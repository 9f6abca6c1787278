//! Command/event protocol between the application shell and the coordinator.
//!
//! Commands flow application → coordinator; events flow coordinator →
//! application over the single ordered event sink. Both are plain tagged
//! enums so shells on any platform channel can serialize them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer::Peer;
use crate::types::{PeerId, TransportKind};

// ----------------------------------------------------------------------------
// Command: Application → Coordinator
// ----------------------------------------------------------------------------

/// Commands issued by the application shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Begin peer discovery on one transport.
    StartDiscovery { kind: TransportKind },
    /// Halt discovery. No-op if not discovering.
    StopDiscovery { kind: TransportKind },
    /// Begin advertising under the given name.
    StartAdvertise { kind: TransportKind, name: String },
    /// Halt advertising. No-op if not advertising.
    StopAdvertise { kind: TransportKind },
    /// Request an outbound connection. Outcome arrives later as
    /// `Event::ConnectionResult`.
    Connect { peer_id: PeerId },
    /// Enqueue a payload for delivery over the peer's connection.
    Send { peer_id: PeerId, data: Vec<u8> },
}

impl Command {
    pub fn kind_of(&self) -> CommandKind {
        match self {
            Command::StartDiscovery { .. } => CommandKind::StartDiscovery,
            Command::StopDiscovery { .. } => CommandKind::StopDiscovery,
            Command::StartAdvertise { .. } => CommandKind::StartAdvertise,
            Command::StopAdvertise { .. } => CommandKind::StopAdvertise,
            Command::Connect { .. } => CommandKind::Connect,
            Command::Send { .. } => CommandKind::Send,
        }
    }
}

/// Command discriminant, used to tag asynchronous failures back to the
/// operation that caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    StartDiscovery,
    StopDiscovery,
    StartAdvertise,
    StopAdvertise,
    Connect,
    Send,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::StartDiscovery => "startDiscovery",
            CommandKind::StopDiscovery => "stopDiscovery",
            CommandKind::StartAdvertise => "advertise",
            CommandKind::StopAdvertise => "stopAdvertise",
            CommandKind::Connect => "connect",
            CommandKind::Send => "send",
        };
        write!(f, "{name}")
    }
}

// ----------------------------------------------------------------------------
// Event: Coordinator → Application
// ----------------------------------------------------------------------------

/// Events delivered on the single ordered event sink.
///
/// Per-peer ordering matches the order the owning driver raised the
/// underlying callbacks; no ordering is guaranteed across peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A peer was discovered, or an existing peer was sighted again.
    PeerFound { peer: Peer },
    /// A peer was lost (driver report or staleness eviction).
    PeerLost { peer_id: PeerId, kind: TransportKind },
    /// Outcome of a connection attempt, inbound or outbound.
    ConnectionResult {
        peer_id: PeerId,
        kind: TransportKind,
        success: bool,
    },
    /// An established connection was torn down.
    Disconnected { peer_id: PeerId, kind: TransportKind },
    /// A payload arrived from a connected peer.
    MessageReceived {
        peer_id: PeerId,
        kind: TransportKind,
        data: Vec<u8>,
    },
    /// An asynchronous native failure. The triggering command already
    /// returned, so the failure is observable only here. Never retried
    /// automatically.
    OperationFailed {
        command: CommandKind,
        kind: TransportKind,
        reason: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
