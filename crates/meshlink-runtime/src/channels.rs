//! Channel plumbing between the application shell and the coordinator task.

use tokio::sync::{mpsc, oneshot};

use meshlink_core::{Command, Event, MeshError, Peer, PeerId, Result, TransportKind};

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// Envelope delivered to the coordinator task. Commands carry a reply slot
/// so synchronous precondition errors reach the caller directly instead of
/// the event sink.
#[derive(Debug)]
pub enum Request {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Snapshot of every registry, all transports combined.
    Peers { reply: oneshot::Sender<Vec<Peer>> },
    Shutdown,
}

pub type RequestSender = mpsc::Sender<Request>;
pub type RequestReceiver = mpsc::Receiver<Request>;

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Cloneable handle for issuing commands to a running coordinator.
#[derive(Debug, Clone)]
pub struct MeshHandle {
    requests: RequestSender,
}

impl MeshHandle {
    pub(crate) fn new(requests: RequestSender) -> Self {
        Self { requests }
    }

    /// Issue a command and wait for its synchronous outcome. Asynchronous
    /// outcomes (connection results, native failures) arrive on the event
    /// sink afterwards.
    pub async fn command(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Command { command, reply })
            .await
            .map_err(|_| MeshError::channel("coordinator is gone"))?;
        response
            .await
            .map_err(|_| MeshError::channel("coordinator dropped the reply"))?
    }

    pub async fn start_discovery(&self, kind: TransportKind) -> Result<()> {
        self.command(Command::StartDiscovery { kind }).await
    }

    pub async fn stop_discovery(&self, kind: TransportKind) -> Result<()> {
        self.command(Command::StopDiscovery { kind }).await
    }

    pub async fn start_advertise(&self, kind: TransportKind, name: impl Into<String>) -> Result<()> {
        self.command(Command::StartAdvertise {
            kind,
            name: name.into(),
        })
        .await
    }

    pub async fn stop_advertise(&self, kind: TransportKind) -> Result<()> {
        self.command(Command::StopAdvertise { kind }).await
    }

    pub async fn connect(&self, peer_id: PeerId) -> Result<()> {
        self.command(Command::Connect { peer_id }).await
    }

    pub async fn send(&self, peer_id: PeerId, data: Vec<u8>) -> Result<()> {
        self.command(Command::Send { peer_id, data }).await
    }

    /// Snapshot of all known peers across every registered transport.
    pub async fn peers(&self) -> Result<Vec<Peer>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Peers { reply })
            .await
            .map_err(|_| MeshError::channel("coordinator is gone"))?;
        response
            .await
            .map_err(|_| MeshError::channel("coordinator dropped the reply"))
    }

    /// Ask the coordinator to exit its loop. Idempotent; a missing
    /// coordinator means shutdown already happened.
    pub async fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown).await;
    }
}

// ----------------------------------------------------------------------------
// Event Sink
// ----------------------------------------------------------------------------

/// Receiving end of the single ordered event stream.
#[derive(Debug)]
pub struct EventSink {
    events: mpsc::Receiver<Event>,
}

impl EventSink {
    pub(crate) fn new(events: mpsc::Receiver<Event>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the coordinator has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Non-blocking poll, for shells that drain between frames.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}
