//! Coordinator and channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the coordinator's channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Application command envelopes. Commands are infrequent.
    pub command_buffer_size: usize,
    /// Driver event fan-in. Native callbacks can be bursty.
    pub driver_event_buffer_size: usize,
    /// Event sink to the application.
    pub event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            driver_event_buffer_size: 128,
            event_buffer_size: 128,
        }
    }
}

impl ChannelConfig {
    /// Generous buffers so tests never stall on backpressure.
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            driver_event_buffer_size: 256,
            event_buffer_size: 256,
        }
    }
}

// ----------------------------------------------------------------------------
// Staleness Policy
// ----------------------------------------------------------------------------

/// Coordinator-level peer eviction policy.
///
/// Two of the three native services never report peer loss, so the
/// coordinator ages out idle peers uniformly instead of each driver
/// inventing its own timeout. Layered on top of driver semantics, never
/// inside them. Connected or connecting peers are never evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessConfig {
    pub enabled: bool,
    /// Evict peers unseen for longer than this.
    pub max_age: Duration,
    /// Sweep cadence.
    pub sweep_interval: Duration,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(15),
        }
    }
}

impl StalenessConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Short ages for tests.
    pub fn testing() -> Self {
        Self {
            enabled: true,
            max_age: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(20),
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    pub channels: ChannelConfig,
    pub staleness: StalenessConfig,
}

impl MeshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            staleness: StalenessConfig::testing(),
        }
    }

    pub fn with_staleness(mut self, staleness: StalenessConfig) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.channels.command_buffer_size == 0 {
            return Err("command buffer size cannot be zero".into());
        }
        if self.channels.driver_event_buffer_size == 0 {
            return Err("driver event buffer size cannot be zero".into());
        }
        if self.channels.event_buffer_size == 0 {
            return Err("event buffer size cannot be zero".into());
        }
        if self.staleness.enabled {
            if self.staleness.max_age.is_zero() {
                return Err("staleness max age cannot be zero".into());
            }
            if self.staleness.sweep_interval.is_zero() {
                return Err("staleness sweep interval cannot be zero".into());
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MeshConfig::default().validate().is_ok());
        assert!(MeshConfig::testing().validate().is_ok());
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let mut config = MeshConfig::default();
        config.channels.event_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_staleness_age_rejected_only_when_enabled() {
        let mut config = MeshConfig::default();
        config.staleness.max_age = Duration::ZERO;
        assert!(config.validate().is_err());

        config.staleness.enabled = false;
        assert!(config.validate().is_ok());
    }
}
