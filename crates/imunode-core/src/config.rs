//! Node configuration.
//!
//! The constants here are the compile-time defaults of a production node.
//! [`NodeConfig`] carries them at runtime so tests and the simulator can
//! shorten ticks or lower the sleep threshold.

use std::time::Duration;

use crate::error::{Error, Result};

/// Device identity stamped into every frame.
pub const DEVICE_ID: u8 = b'J';

/// Advertised device name.
pub const DEVICE_NAME: &str = "ESPSensor_J";

/// Sampling interval used until the gateway changes it.
pub const DEFAULT_SAMPLING_INTERVAL_MS: u16 = 50;

/// Unconnected ticks after which the node powers down (10 minutes).
pub const SLEEP_AFTER_TICKS: u32 = 600;

/// Granularity of the unconnected dwell counter.
pub const DWELL_TICK: Duration = Duration::from_secs(1);

/// Configuration for a sensor node.
///
/// Use the builder methods for convenient configuration:
///
/// ```
/// use std::time::Duration;
/// use imunode_core::NodeConfig;
///
/// let config = NodeConfig::default()
///     .device_id(b'K')
///     .sampling_interval_ms(20)
///     .sleep_after_ticks(30);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Identity written into every [`SampleFrame`](imunode_types::SampleFrame).
    pub device_id: u8,
    /// Display name used in log lines. The advertised name belongs to the
    /// transport adapter and is configured there.
    pub device_name: String,
    /// Initial sampling interval in milliseconds.
    pub sampling_interval_ms: u16,
    /// Dwell ticks spent advertising before deep sleep.
    pub sleep_after_ticks: u32,
    /// Length of one dwell tick.
    pub dwell_tick: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: DEVICE_ID,
            device_name: DEVICE_NAME.to_string(),
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            sleep_after_ticks: SLEEP_AFTER_TICKS,
            dwell_tick: DWELL_TICK,
        }
    }
}

impl NodeConfig {
    /// Create a config with the compile-time defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device id.
    #[must_use]
    pub fn device_id(mut self, id: u8) -> Self {
        self.device_id = id;
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the initial sampling interval.
    #[must_use]
    pub fn sampling_interval_ms(mut self, ms: u16) -> Self {
        self.sampling_interval_ms = ms;
        self
    }

    /// Set the number of unconnected ticks before deep sleep.
    #[must_use]
    pub fn sleep_after_ticks(mut self, ticks: u32) -> Self {
        self.sleep_after_ticks = ticks;
        self
    }

    /// Set the dwell tick length.
    #[must_use]
    pub fn dwell_tick(mut self, tick: Duration) -> Self {
        self.dwell_tick = tick;
        self
    }

    /// Time spent advertising before the node powers down.
    pub fn sleep_after(&self) -> Duration {
        self.dwell_tick * self.sleep_after_ticks
    }

    /// Validate the config and return an error if invalid.
    ///
    /// Checks that:
    /// - `sampling_interval_ms` is > 0
    /// - `sleep_after_ticks` is > 0
    /// - `dwell_tick` is > 0
    /// - `device_name` is not empty
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval_ms == 0 {
            return Err(Error::invalid_config("sampling_interval_ms must be > 0"));
        }
        if self.sleep_after_ticks == 0 {
            return Err(Error::invalid_config("sleep_after_ticks must be > 0"));
        }
        if self.dwell_tick.is_zero() {
            return Err(Error::invalid_config("dwell_tick must be > 0"));
        }
        if self.device_name.is_empty() {
            return Err(Error::invalid_config("device_name cannot be empty"));
        }
        Ok(())
    }
}
