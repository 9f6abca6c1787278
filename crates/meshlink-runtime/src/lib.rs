//! Transport coordinator runtime for meshlink.
//!
//! Hosts the single coordinator task that owns every registered driver and
//! its peer registry. Commands enter over a request channel with per-command
//! reply envelopes; everything observable leaves through one ordered event
//! sink. The coordinator is the only task touching driver or registry state,
//! so no locks guard either.

mod builder;
mod channels;
mod coordinator;

pub use builder::MeshBuilder;
pub use channels::{EventSink, MeshHandle, Request, RequestReceiver, RequestSender};
pub use coordinator::Coordinator;
