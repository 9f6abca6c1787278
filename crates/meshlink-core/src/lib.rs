//! Core vocabulary for the meshlink proximity transport.
//!
//! This crate defines the types shared by every transport driver and by the
//! coordinator runtime: peer identifiers and records, the command/event
//! protocol exposed to the application shell, the `Driver` trait each
//! transport adapter implements, the per-driver peer registry, and the
//! unified error taxonomy.

pub mod config;
pub mod driver;
pub mod errors;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod types;

pub use config::{ChannelConfig, MeshConfig, StalenessConfig};
pub use driver::{Driver, DriverCapabilities, DriverEvent, NativeError};
pub use errors::{MeshError, Result};
pub use peer::{ConnectionDirection, ConnectionState, Peer};
pub use protocol::{Command, CommandKind, Event};
pub use registry::PeerRegistry;
pub use types::{PeerId, Timestamp, TransportKind};
