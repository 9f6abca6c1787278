//! Driver abstraction shared by every transport adapter.
//!
//! Each native proximity API (BLE advertise/scan, the discovery service, the
//! multicast session service) is wrapped by exactly one `Driver`
//! implementation. Drivers translate their native callbacks into the common
//! `DriverEvent` vocabulary and never leak native callback types to the
//! coordinator.

use async_trait::async_trait;
use smallvec::SmallVec;
use tokio::sync::mpsc;

use crate::errors::{MeshError, Result};
use crate::types::{PeerId, TransportKind};

// ----------------------------------------------------------------------------
// Native Error Seam
// ----------------------------------------------------------------------------

/// Failure classes reported by a native seam. Adapters convert these into
/// `MeshError` variants on synchronous paths and into
/// `DriverEvent::NativeFailure` on asynchronous ones.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("native failure: {0}")]
    Failure(String),
}

impl NativeError {
    /// Convert a synchronous native failure into the unified taxonomy.
    pub fn into_mesh_error(self, kind: TransportKind, operation: &str) -> MeshError {
        match self {
            NativeError::PermissionDenied => {
                MeshError::permission(format!("{operation} on {kind}"))
            }
            NativeError::Unavailable(reason) => MeshError::unavailable(kind, reason),
            NativeError::Failure(reason) => MeshError::native(operation, reason),
        }
    }
}

// ----------------------------------------------------------------------------
// Driver Events
// ----------------------------------------------------------------------------

/// Normalized native-callback vocabulary, produced by drivers and consumed
/// only by the coordinator. Carries the original peer/command identity so
/// outcomes can be correlated without closure capture.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A peer was sighted (broadcast frame, endpoint found, peer browsed).
    PeerSighted {
        kind: TransportKind,
        id: PeerId,
        name: String,
        address: Option<String>,
        rssi: Option<i16>,
    },
    /// The native layer reported the peer gone. Only some transports emit
    /// this; the others rely on the coordinator staleness policy.
    PeerVanished { kind: TransportKind, id: PeerId },
    /// A connection attempt resolved, inbound or outbound.
    ConnectionOutcome {
        kind: TransportKind,
        id: PeerId,
        success: bool,
        inbound: bool,
    },
    /// An established connection was torn down by the native layer.
    Disconnected { kind: TransportKind, id: PeerId },
    /// A payload arrived.
    PayloadArrived {
        kind: TransportKind,
        from: PeerId,
        data: Vec<u8>,
    },
    /// An asynchronous native failure tied to the operation that caused it.
    NativeFailure {
        kind: TransportKind,
        operation: crate::protocol::CommandKind,
        reason: String,
    },
}

/// Fan-in channel from drivers to the coordinator.
pub type DriverEventSender = mpsc::Sender<DriverEvent>;
pub type DriverEventReceiver = mpsc::Receiver<DriverEvent>;

// ----------------------------------------------------------------------------
// Capabilities
// ----------------------------------------------------------------------------

/// Static characteristics the coordinator needs to route and validate
/// commands without hiding transport differences incorrectly.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    pub kind: TransportKind,
    /// Documented payload cap. Oversize sends are rejected, never fragmented.
    pub max_payload: usize,
    /// Whether the transport has a connection concept at all. When `false`
    /// (BLE broadcast), `connect` resolves immediately and `send` needs no
    /// prior connection.
    pub supports_connections: bool,
    /// Whether the native layer ever emits `PeerVanished`.
    pub reports_peer_loss: bool,
}

// ----------------------------------------------------------------------------
// Driver Trait
// ----------------------------------------------------------------------------

/// Uniform capability set over one native proximity API.
///
/// All methods are non-blocking with respect to native round-trips: they
/// issue the native call and return; outcomes surface as `DriverEvent`s on
/// the fan-in channel. Synchronous errors are limited to local precondition
/// and availability checks.
#[async_trait]
pub trait Driver: Send {
    fn kind(&self) -> TransportKind;

    fn capabilities(&self) -> DriverCapabilities;

    async fn start_discovery(&mut self) -> Result<()>;

    async fn stop_discovery(&mut self) -> Result<()>;

    async fn start_advertise(&mut self, name: &str) -> Result<()>;

    async fn stop_advertise(&mut self) -> Result<()>;

    /// Request an outbound connection. Fire-and-forget: resolution arrives
    /// as `DriverEvent::ConnectionOutcome`.
    async fn connect(&mut self, peer: &PeerId) -> Result<()>;

    /// Deliver a payload over the peer's connection. Size validation happens
    /// at the coordinator against `capabilities().max_payload`.
    async fn send(&mut self, peer: &PeerId, data: Vec<u8>) -> Result<()>;

    /// Snapshot of peers this driver currently considers reachable.
    fn known_peers(&self) -> SmallVec<[PeerId; 8]>;
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_maps_to_taxonomy() {
        let err = NativeError::PermissionDenied.into_mesh_error(TransportKind::Ble, "startScan");
        assert!(matches!(err, MeshError::Permission { .. }));

        let err = NativeError::Unavailable("radio off".into())
            .into_mesh_error(TransportKind::Ble, "startScan");
        assert!(matches!(err, MeshError::Unavailable { .. }));

        let err = NativeError::Failure("busy".into()).into_mesh_error(TransportKind::Nearby, "send");
        assert!(matches!(err, MeshError::Native { .. }));
    }
}
