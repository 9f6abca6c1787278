//! Shared broadcast medium for BLE radios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use meshlink_ble::{BleCallback, BleCallbackReceiver, BleCallbackSender, BleRadio};
use meshlink_core::NativeError;

/// Signal strength every sighting in the fabric reports.
const AIR_RSSI: i16 = -60;

const CALLBACK_BUFFER: usize = 64;

#[derive(Default)]
struct AirState {
    radios: HashMap<String, RadioSlot>,
}

struct RadioSlot {
    callbacks: BleCallbackSender,
    scanning: bool,
    advertising: Option<String>,
}

/// One shared airspace; every radio spawned from it hears the others.
#[derive(Clone, Default)]
pub struct BleAirspace {
    state: Arc<Mutex<AirState>>,
}

impl BleAirspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a radio at `address`. Returns the radio, its callback stream, and
    /// a controls handle for flipping permission and power.
    pub fn spawn_radio(
        &self,
        address: impl Into<String>,
    ) -> (AirRadio, BleCallbackReceiver, RadioControls) {
        let address = address.into();
        let (tx, rx) = mpsc::channel(CALLBACK_BUFFER);
        if let Ok(mut state) = self.state.lock() {
            state.radios.insert(
                address.clone(),
                RadioSlot {
                    callbacks: tx,
                    scanning: false,
                    advertising: None,
                },
            );
        }
        let controls = RadioControls {
            permission: Arc::new(AtomicBool::new(true)),
            powered: Arc::new(AtomicBool::new(true)),
        };
        let radio = AirRadio {
            address,
            state: Arc::clone(&self.state),
            controls: controls.clone(),
        };
        (radio, rx, controls)
    }
}

/// Flips the simulated OS preconditions for one radio.
#[derive(Clone)]
pub struct RadioControls {
    permission: Arc<AtomicBool>,
    powered: Arc<AtomicBool>,
}

impl RadioControls {
    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn set_powered(&self, on: bool) {
        self.powered.store(on, Ordering::SeqCst);
    }
}

/// A radio participating in one [`BleAirspace`].
pub struct AirRadio {
    address: String,
    state: Arc<Mutex<AirState>>,
    controls: RadioControls,
}

impl AirRadio {
    fn check_preconditions(&self) -> Result<(), NativeError> {
        if !self.controls.permission.load(Ordering::SeqCst) {
            return Err(NativeError::PermissionDenied);
        }
        if !self.controls.powered.load(Ordering::SeqCst) {
            return Err(NativeError::Unavailable("adapter is off".into()));
        }
        Ok(())
    }

    /// Collect pending sightings under the lock, deliver them after.
    fn sightings_for_scanner(&self, state: &AirState) -> Vec<(BleCallbackSender, BleCallback)> {
        let Some(me) = state.radios.get(&self.address) else {
            return Vec::new();
        };
        state
            .radios
            .iter()
            .filter(|(addr, _)| *addr != &self.address)
            .filter_map(|(addr, slot)| {
                slot.advertising.as_ref().map(|name| {
                    (
                        me.callbacks.clone(),
                        BleCallback::Sighting {
                            address: addr.clone(),
                            name: name.clone(),
                            rssi: AIR_RSSI,
                        },
                    )
                })
            })
            .collect()
    }
}

#[async_trait]
impl BleRadio for AirRadio {
    async fn start_scan(&mut self) -> Result<(), NativeError> {
        self.check_preconditions()?;
        let deliveries = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| NativeError::Failure("airspace poisoned".into()))?;
            if let Some(slot) = state.radios.get_mut(&self.address) {
                slot.scanning = true;
            }
            self.sightings_for_scanner(&state)
        };
        for (tx, callback) in deliveries {
            let _ = tx.send(callback).await;
        }
        debug!(address = %self.address, "airspace scan on");
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), NativeError> {
        self.check_preconditions()?;
        if let Ok(mut state) = self.state.lock() {
            if let Some(slot) = state.radios.get_mut(&self.address) {
                slot.scanning = false;
            }
        }
        Ok(())
    }

    async fn start_advertise(&mut self, name: &str) -> Result<(), NativeError> {
        self.check_preconditions()?;
        let deliveries: Vec<(BleCallbackSender, BleCallback)> = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| NativeError::Failure("airspace poisoned".into()))?;
            if let Some(slot) = state.radios.get_mut(&self.address) {
                slot.advertising = Some(name.to_owned());
            }
            // Every active scanner sights the new advertiser.
            state
                .radios
                .iter()
                .filter(|(addr, slot)| *addr != &self.address && slot.scanning)
                .map(|(_, slot)| {
                    (
                        slot.callbacks.clone(),
                        BleCallback::Sighting {
                            address: self.address.clone(),
                            name: name.to_owned(),
                            rssi: AIR_RSSI,
                        },
                    )
                })
                .collect()
        };
        for (tx, callback) in deliveries {
            let _ = tx.send(callback).await;
        }
        debug!(address = %self.address, %name, "airspace advertise on");
        Ok(())
    }

    async fn stop_advertise(&mut self) -> Result<(), NativeError> {
        self.check_preconditions()?;
        if let Ok(mut state) = self.state.lock() {
            if let Some(slot) = state.radios.get_mut(&self.address) {
                slot.advertising = None;
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
