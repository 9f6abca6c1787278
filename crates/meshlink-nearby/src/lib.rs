//! Discovery-service driver adapter for meshlink.
//!
//! Wraps the connection-oriented endpoint discovery service: peers advertise
//! under a service identifier, discoverers receive endpoint-found callbacks,
//! and payload delivery requires a two-sided `initiated` → `resolved`
//! handshake. Payloads are reliable, ordered byte streams.
//!
//! Policy carried over from the platform layer: initiated connections are
//! always accepted, on both the inbound and the outbound side. Signal
//! strength is synthetic: the service exposes none, so discovery sightings
//! report -50 dBm and freshly connected endpoints -45 dBm.

mod client;
mod driver;

pub use client::{ConnectionsClient, NearbyCallback, NearbyCallbackReceiver, NearbyCallbackSender};
pub use driver::{NearbyDriver, NearbyDriverConfig, NEARBY_MAX_PAYLOAD, NEARBY_SERVICE_ID};
