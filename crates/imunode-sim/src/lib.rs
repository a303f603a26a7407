//! Desktop simulator for IMU sensor nodes.
//!
//! Runs one or more [`imunode_core::Node`]s with simulated sensors, links
//! them in-process to a scripted gateway, and prints the aligned frames
//! the gateway receives.
//!
//! # Configuration
//!
//! The simulator reads configuration from `~/.config/imunode/sim.toml`:
//!
//! ```toml
//! [gateway]
//! sampling_interval_ms = 50
//! capture_secs = 5
//! deep_sleep = true
//!
//! [output]
//! format = "csv"
//!
//! [[nodes]]
//! id = "J"
//!
//! [[nodes]]
//! id = "K"
//! self_test = true
//! ```

pub mod config;
pub mod format;
pub mod gateway;
pub mod loopback;
pub mod runner;

pub use config::{
    Config, ConfigError, GatewayConfig, NodeSpec, OutputConfig, ValidationError,
    default_config_path,
};
pub use format::{FormatOptions, OutputFormat};
pub use gateway::{GatewayReport, VirtualGateway};
pub use loopback::{GatewayLink, LogIndicator, LoopbackTransport, Notification, Uplink, loopback};
pub use runner::{NodeOutcome, SimError, SimReport, SimSensor, run_simulation};
