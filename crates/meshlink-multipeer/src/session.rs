//! Native seam for the multicast session service.

use std::time::Duration;

use async_trait::async_trait;
use meshlink_core::NativeError;
use tokio::sync::mpsc;

/// Connection phase of one session member, as reported natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotConnected,
    Connecting,
    Connected,
}

/// Asynchronous callbacks raised by the session service.
#[derive(Debug, Clone)]
pub enum SessionCallback {
    /// A browsing participant saw a peer advertising nearby. Peer IDs are
    /// the remote display names.
    PeerFound { id: String },
    /// The browser lost sight of the peer.
    PeerLost { id: String },
    /// A remote peer invited us into its session.
    InvitationReceived { id: String },
    /// The session reported a peer moving between connection phases.
    StateChanged { id: String, state: SessionState },
    /// A byte payload arrived from a session member.
    DataReceived { id: String, data: Vec<u8> },
}

pub type SessionCallbackSender = mpsc::Sender<SessionCallback>;
pub type SessionCallbackReceiver = mpsc::Receiver<SessionCallback>;

/// One owned host of a multicast session.
///
/// State transitions arrive on the callback channel; invitation acceptance
/// is an explicit host call so the accept policy stays in the driver.
#[async_trait]
pub trait SessionHost: Send {
    async fn start_browsing(&mut self) -> Result<(), NativeError>;

    async fn stop_browsing(&mut self) -> Result<(), NativeError>;

    async fn start_advertising(&mut self, name: &str) -> Result<(), NativeError>;

    async fn stop_advertising(&mut self) -> Result<(), NativeError>;

    /// Invite a browsed peer into our session. The outcome arrives as a
    /// `StateChanged` callback; `timeout` bounds how long the invitation
    /// stays open on the remote side.
    async fn invite(&mut self, peer: &str, timeout: Duration) -> Result<(), NativeError>;

    /// Accept a received invitation, joining the inviter's session.
    async fn accept_invitation(&mut self, peer: &str) -> Result<(), NativeError>;

    async fn send(&mut self, peer: &str, data: Vec<u8>) -> Result<(), NativeError>;

    async fn disconnect(&mut self, peer: &str) -> Result<(), NativeError>;
}
