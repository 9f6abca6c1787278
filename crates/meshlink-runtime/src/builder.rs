//! Builder for wiring drivers into a coordinator and spawning it.

use tokio::sync::mpsc;
use tracing::info;

use meshlink_core::driver::{Driver, DriverEventReceiver, DriverEventSender};
use meshlink_core::{MeshConfig, MeshError, Result, TransportKind};

use crate::channels::{EventSink, MeshHandle};
use crate::coordinator::Coordinator;

/// Assembles drivers and channels, then spawns the coordinator task.
///
/// The builder owns the driver-event fan-in channel so drivers constructed
/// before `spawn` can clone its sending half via [`MeshBuilder::driver_events`].
pub struct MeshBuilder {
    config: MeshConfig,
    drivers: Vec<Box<dyn Driver>>,
    driver_tx: DriverEventSender,
    driver_rx: DriverEventReceiver,
}

impl MeshBuilder {
    pub fn new(config: MeshConfig) -> Self {
        let (driver_tx, driver_rx) =
            mpsc::channel(config.channels.driver_event_buffer_size.max(1));
        Self {
            config,
            drivers: Vec::new(),
            driver_tx,
            driver_rx,
        }
    }

    /// Sending half of the driver-event fan-in, for driver construction.
    pub fn driver_events(&self) -> DriverEventSender {
        self.driver_tx.clone()
    }

    /// Register a driver. At most one driver per transport kind.
    pub fn register<D: Driver + 'static>(mut self, driver: D) -> Result<Self> {
        let kind = driver.kind();
        if self.drivers.iter().any(|d| d.kind() == kind) {
            return Err(MeshError::config(format!(
                "driver for {kind} already registered"
            )));
        }
        self.drivers.push(Box::new(driver));
        Ok(self)
    }

    pub fn registered_kinds(&self) -> Vec<TransportKind> {
        self.drivers.iter().map(|d| d.kind()).collect()
    }

    /// Validate the configuration, spawn the coordinator, and hand back the
    /// command handle and the event sink.
    pub fn spawn(self) -> Result<(MeshHandle, EventSink)> {
        self.config.validate().map_err(MeshError::config)?;
        if self.drivers.is_empty() {
            return Err(MeshError::config("no drivers registered"));
        }

        let (request_tx, request_rx) =
            mpsc::channel(self.config.channels.command_buffer_size);
        let (event_tx, event_rx) = mpsc::channel(self.config.channels.event_buffer_size);

        let kinds = self.registered_kinds();
        let coordinator = Coordinator::new(
            self.config,
            self.drivers,
            request_rx,
            self.driver_rx,
            self.driver_tx,
            event_tx,
        );
        tokio::spawn(coordinator.run());
        info!(?kinds, "mesh runtime spawned");

        Ok((MeshHandle::new(request_tx), EventSink::new(event_rx)))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meshlink_core::driver::DriverCapabilities;
    use meshlink_core::PeerId;
    use smallvec::SmallVec;

    struct NullDriver(TransportKind);

    #[async_trait]
    impl Driver for NullDriver {
        fn kind(&self) -> TransportKind {
            self.0
        }
        fn capabilities(&self) -> DriverCapabilities {
            DriverCapabilities {
                kind: self.0,
                max_payload: 512,
                supports_connections: false,
                reports_peer_loss: false,
            }
        }
        async fn start_discovery(&mut self) -> Result<()> {
            Ok(())
        }
        async fn stop_discovery(&mut self) -> Result<()> {
            Ok(())
        }
        async fn start_advertise(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn stop_advertise(&mut self) -> Result<()> {
            Ok(())
        }
        async fn connect(&mut self, _peer: &PeerId) -> Result<()> {
            Ok(())
        }
        async fn send(&mut self, _peer: &PeerId, _data: Vec<u8>) -> Result<()> {
            Ok(())
        }
        fn known_peers(&self) -> SmallVec<[PeerId; 8]> {
            SmallVec::new()
        }
    }

    #[tokio::test]
    async fn duplicate_kind_is_rejected() {
        let builder = MeshBuilder::new(MeshConfig::testing())
            .register(NullDriver(TransportKind::Ble))
            .unwrap();
        match builder.register(NullDriver(TransportKind::Ble)) {
            Err(err) => assert!(matches!(err, MeshError::Configuration { .. })),
            Ok(_) => panic!("duplicate registration accepted"),
        }
    }

    #[tokio::test]
    async fn spawn_requires_at_least_one_driver() {
        let err = MeshBuilder::new(MeshConfig::testing()).spawn().unwrap_err();
        assert!(matches!(err, MeshError::Configuration { .. }));
    }

    #[tokio::test]
    async fn spawn_yields_working_handle() {
        let (handle, _sink) = MeshBuilder::new(MeshConfig::testing())
            .register(NullDriver(TransportKind::Ble))
            .unwrap()
            .spawn()
            .unwrap();

        handle.start_discovery(TransportKind::Ble).await.unwrap();
        // No driver for this kind.
        let err = handle
            .start_discovery(TransportKind::Nearby)
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Unavailable { .. }));
        handle.shutdown().await;
    }
}
