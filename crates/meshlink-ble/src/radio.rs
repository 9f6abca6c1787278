//! Native seam for the platform BLE stack.

use async_trait::async_trait;
use meshlink_core::NativeError;
use tokio::sync::mpsc;

/// Asynchronous callbacks raised by the native BLE stack.
#[derive(Debug, Clone)]
pub enum BleCallback {
    /// One broadcast frame from a nearby advertiser.
    Sighting {
        address: String,
        name: String,
        rssi: i16,
    },
    /// Scanning failed asynchronously (radio reset, etc).
    ScanFailed { reason: String },
    /// Advertising rejected after a successful start.
    AdvertiseFailed { reason: String },
}

pub type BleCallbackSender = mpsc::Sender<BleCallback>;
pub type BleCallbackReceiver = mpsc::Receiver<BleCallback>;

/// One platform BLE manager: scanner plus advertiser.
///
/// Start operations must validate permissions and radio availability before
/// touching the hardware: `PermissionDenied` when the OS capability is
/// missing, `Unavailable` when the radio is off or absent. Sightings arrive
/// on the callback channel handed out at construction.
#[async_trait]
pub trait BleRadio: Send {
    async fn start_scan(&mut self) -> Result<(), NativeError>;

    async fn stop_scan(&mut self) -> Result<(), NativeError>;

    /// Sets the local broadcast name, then starts advertising.
    async fn start_advertise(&mut self, name: &str) -> Result<(), NativeError>;

    async fn stop_advertise(&mut self) -> Result<(), NativeError>;
}
