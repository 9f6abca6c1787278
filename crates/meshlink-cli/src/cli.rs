//! Command-line argument definitions.

use clap::{Parser, ValueEnum};
use meshlink_core::TransportKind;

#[derive(Debug, Parser)]
#[command(name = "meshlink", about = "Run a two-node proximity demo over a simulated transport")]
pub struct Cli {
    /// Transport fabric to demonstrate.
    #[arg(short, long, value_enum, default_value_t = Transport::Nearby)]
    pub transport: Transport,

    /// Display name for the first node.
    #[arg(long, default_value = "Alice")]
    pub name_a: String,

    /// Display name for the second node.
    #[arg(long, default_value = "Bob")]
    pub name_b: String,

    /// Message the first node sends once connected.
    #[arg(short, long, default_value = "hello from meshlink")]
    pub message: String,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Ble,
    Nearby,
    Multipeer,
}

impl Transport {
    pub fn kind(self) -> TransportKind {
        match self {
            Transport::Ble => TransportKind::Ble,
            Transport::Nearby => TransportKind::Nearby,
            Transport::Multipeer => TransportKind::Multipeer,
        }
    }
}
