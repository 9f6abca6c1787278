//! Native seam for the endpoint discovery service.

use async_trait::async_trait;
use meshlink_core::NativeError;
use tokio::sync::mpsc;

/// Asynchronous callbacks raised by the discovery service.
#[derive(Debug, Clone)]
pub enum NearbyCallback {
    /// A remote endpoint advertising the same service was found.
    EndpointFound { id: String, name: String },
    /// The service reported the endpoint gone.
    EndpointLost { id: String },
    /// A connection handshake started. `inbound` is true when the remote
    /// side requested it.
    ConnectionInitiated { id: String, inbound: bool },
    /// The handshake resolved after both sides answered.
    ConnectionResolved { id: String, success: bool },
    /// An established connection dropped.
    Disconnected { id: String },
    /// A byte payload arrived.
    PayloadReceived { id: String, data: Vec<u8> },
}

pub type NearbyCallbackSender = mpsc::Sender<NearbyCallback>;
pub type NearbyCallbackReceiver = mpsc::Receiver<NearbyCallback>;

/// One owned connections client for the discovery service.
///
/// Completion of fire-and-forget calls is correlated by endpoint ID on the
/// callback channel, never by closure capture.
#[async_trait]
pub trait ConnectionsClient: Send {
    async fn start_discovery(&mut self, service_id: &str) -> Result<(), NativeError>;

    async fn stop_discovery(&mut self) -> Result<(), NativeError>;

    async fn start_advertising(&mut self, name: &str, service_id: &str)
        -> Result<(), NativeError>;

    async fn stop_advertising(&mut self) -> Result<(), NativeError>;

    /// Request an outbound connection; both sides will observe
    /// `ConnectionInitiated` followed by `ConnectionResolved`.
    async fn request_connection(
        &mut self,
        local_name: &str,
        endpoint: &str,
    ) -> Result<(), NativeError>;

    /// Answer an initiated connection.
    async fn accept_connection(&mut self, endpoint: &str) -> Result<(), NativeError>;

    async fn send_payload(&mut self, endpoint: &str, data: Vec<u8>) -> Result<(), NativeError>;

    async fn disconnect(&mut self, endpoint: &str) -> Result<(), NativeError>;
}
