//! Bluetooth Low Energy driver adapter for meshlink.
//!
//! BLE is the connectionless transport: a peer "found" is a single broadcast
//! frame carrying the device's advertised name and a real RSSI measurement.
//! There is no connection handshake and no payload channel: `connect`
//! resolves immediately and `send` is a no-op success, exactly as the
//! platform layer behaves. Peer loss is never reported natively; eviction is
//! the coordinator's staleness policy.
//!
//! The adapter owns a single [`BleRadio`] instance (the platform Bluetooth
//! manager wrapped with an explicit lifecycle, never a process-wide
//! singleton) and translates its callbacks into the common `DriverEvent`
//! vocabulary.

mod driver;
mod radio;

pub use driver::{BleDriver, BleDriverConfig, BLE_MAX_PAYLOAD};
pub use radio::{BleCallback, BleCallbackReceiver, BleCallbackSender, BleRadio};
