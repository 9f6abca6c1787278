//! Unified error taxonomy for the meshlink transport core.
//!
//! Synchronous precondition failures are returned to the caller as typed
//! variants; asynchronous native failures never appear here. They travel
//! through the event stream as `Event::OperationFailed`.

use crate::types::{PeerId, TransportKind};

/// Errors surfaced synchronously by coordinator commands and driver calls.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A required OS capability is not granted. Never retried automatically.
    #[error("permission not granted: {reason}")]
    Permission { reason: String },

    /// The underlying radio or service is absent or disabled.
    #[error("transport unavailable ({kind}): {reason}")]
    Unavailable { kind: TransportKind, reason: String },

    /// The caller referenced a peer no active driver has reported.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// `send` was issued without an active connection for the peer.
    #[error("peer not connected: {0}")]
    NotConnected(PeerId),

    /// Payload exceeds the owning driver's transport limit. Rejected rather
    /// than fragmented: fragmentation semantics differ per native API.
    #[error("payload too large: {size} bytes (max {max} on {kind})")]
    PayloadTooLarge {
        kind: TransportKind,
        size: usize,
        max: usize,
    },

    /// A native call failed before it could be dispatched asynchronously.
    #[error("native failure during {operation}: {reason}")]
    Native { operation: String, reason: String },

    /// Internal channel plumbing failed (coordinator gone or buffer closed).
    #[error("channel error: {message}")]
    Channel { message: String },

    /// Invalid configuration.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl MeshError {
    pub fn permission(reason: impl Into<String>) -> Self {
        MeshError::Permission {
            reason: reason.into(),
        }
    }

    pub fn unavailable(kind: TransportKind, reason: impl Into<String>) -> Self {
        MeshError::Unavailable {
            kind,
            reason: reason.into(),
        }
    }

    pub fn native(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        MeshError::Native {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        MeshError::Channel {
            message: message.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        MeshError::Configuration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
