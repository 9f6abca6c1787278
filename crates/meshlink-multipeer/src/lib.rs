//! Session-oriented multicast driver adapter for meshlink.
//!
//! Wraps a multicast session service: every participant browses and
//! advertises under a display name, joining is invitation-based, and all
//! members of the session can exchange reliable byte payloads. The browser
//! raises a lost-peer callback, but the platform layer never acts on it;
//! eviction is the coordinator's staleness policy, as on every transport.
//!
//! Policy carried over from the platform layer: incoming invitations are
//! always accepted, and outbound invitations carry a fixed expiry. The
//! service exposes no signal strength, so sightings report a synthetic
//! -40 dBm.

mod driver;
mod session;

pub use driver::{
    MultipeerDriver, MultipeerDriverConfig, INVITE_TIMEOUT, MULTIPEER_MAX_PAYLOAD,
};
pub use session::{
    SessionCallback, SessionCallbackReceiver, SessionCallbackSender, SessionHost, SessionState,
};
