//! In-memory stand-ins for the three native proximity services.
//!
//! Each fabric couples several participants through shared state so that
//! drivers, the coordinator, and demos can run without any real radio:
//!
//! - [`BleAirspace`]: broadcast medium; advertisers are sighted by scanners.
//! - [`NearbyHub`]: endpoint discovery service with the two-sided
//!   initiated/resolved handshake.
//! - [`SessionMesh`]: multicast sessions joined by invitation.
//!
//! The fabrics implement the native seam traits, so a driver wired to one is
//! exercised over exactly the call surface a platform binding would use.

mod airspace;
mod hub;
mod session_mesh;

pub use airspace::{AirRadio, BleAirspace, RadioControls};
pub use hub::{HubEndpoint, NearbyHub};
pub use session_mesh::{MeshMember, SessionMesh};
