//! Simulator configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use imunode_core::NodeConfig;
use imunode_core::config::{DEFAULT_SAMPLING_INTERVAL_MS, DEVICE_ID, SLEEP_AFTER_TICKS};

use crate::format::OutputFormat;

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Virtual gateway behavior.
    pub gateway: GatewayConfig,
    /// How received rows are printed.
    pub output: OutputConfig,
    /// Simulated nodes.
    pub nodes: Vec<NodeSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            output: OutputConfig::default(),
            nodes: vec![NodeSpec::default()],
        }
    }
}

impl Config {
    /// Configuration at [`default_config_path`], or the defaults when no
    /// file exists there yet.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        match path.try_exists() {
            Ok(true) => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse a TOML file. The result is not validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::io("read", path, source))?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write as pretty TOML, creating missing parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::io("create", dir, source))?;
        }
        std::fs::write(path, text).map_err(|source| ConfigError::io("write", path, source))
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - At least one node is configured
    /// - Node ids are ASCII alphanumeric and unique
    /// - Noise amplitudes are finite and non-negative
    /// - Gateway interval and capture time are non-zero
    ///
    /// # Example
    ///
    /// ```
    /// use imunode_sim::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.gateway.validate());

        if self.nodes.is_empty() {
            errors.push(ValidationError {
                field: "nodes".to_string(),
                message: "at least one node is required".to_string(),
            });
        }

        let mut seen_ids = HashSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let prefix = format!("nodes[{}]", i);
            errors.extend(node.validate(&prefix));

            if !seen_ids.insert(node.id) {
                errors.push(ValidationError {
                    field: format!("{}.id", prefix),
                    message: format!("duplicate node id '{}'", node.id),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Scripted gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interval sent to every node before the resync.
    pub sampling_interval_ms: u16,
    /// Capture duration after the resync, in seconds.
    pub capture_secs: u64,
    /// Send the deep-sleep command to every node when the capture ends.
    /// Otherwise the gateway just disconnects.
    pub deep_sleep: bool,
    /// Pause between connecting to each node.
    pub connect_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            capture_secs: 5,
            deep_sleep: false,
            connect_delay_ms: 100,
        }
    }
}

impl GatewayConfig {
    /// Validate gateway configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.sampling_interval_ms == 0 {
            errors.push(ValidationError {
                field: "gateway.sampling_interval_ms".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        if self.capture_secs == 0 {
            errors.push(ValidationError {
                field: "gateway.capture_secs".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        errors
    }

    /// Capture duration.
    pub fn capture(&self) -> Duration {
        Duration::from_secs(self.capture_secs)
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Row format.
    pub format: OutputFormat,
    /// Omit the header line in CSV output.
    pub no_header: bool,
}

/// One simulated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    /// Device id stamped into frames.
    pub id: char,
    /// Advertised name; derived from the id when unset.
    pub name: Option<String>,
    /// Accelerometer noise amplitude in g.
    pub accel_noise: f32,
    /// Gyroscope noise amplitude in deg/s.
    pub gyro_noise: f32,
    /// Report a button level instead of motion.
    pub self_test: bool,
    /// Idle dwell ticks before deep sleep.
    pub sleep_after_ticks: u32,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            id: char::from(DEVICE_ID),
            name: None,
            accel_noise: 0.02,
            gyro_noise: 0.5,
            self_test: false,
            sleep_after_ticks: SLEEP_AFTER_TICKS,
        }
    }
}

impl NodeSpec {
    /// A default node with the given id.
    pub fn with_id(id: char) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Advertised name.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("ESPSensor_{}", self.id))
    }

    /// Build the node configuration. Call after [`validate`](Self::validate).
    pub fn node_config(&self, sampling_interval_ms: u16) -> NodeConfig {
        NodeConfig::default()
            .device_id(self.id as u8)
            .device_name(self.display_name())
            .sampling_interval_ms(sampling_interval_ms)
            .sleep_after_ticks(self.sleep_after_ticks)
    }

    /// Validate node configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.id.is_ascii_alphanumeric() {
            errors.push(ValidationError {
                field: format!("{}.id", prefix),
                message: format!("'{}' is not an ASCII letter or digit", self.id),
            });
        }

        if let Some(name) = &self.name
            && name.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.name", prefix),
                message: "cannot be empty string (use null/omit for default)".to_string(),
            });
        }

        for (field, value) in [("accel_noise", self.accel_noise), ("gyro_noise", self.gyro_noise)] {
            if !value.is_finite() || value < 0.0 {
                errors.push(ValidationError {
                    field: format!("{}.{}", prefix, field),
                    message: format!("must be a non-negative number, got {}", value),
                });
            }
        }

        if self.sleep_after_ticks == 0 {
            errors.push(ValidationError {
                field: format!("{}.sleep_after_ticks", prefix),
                message: "must be > 0".to_string(),
            });
        }

        errors
    }
}

/// Failure to load, save or validate the simulator configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot encode configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration validation failed:\n{}", bullets(.0))]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One rejected field, e.g. `nodes[1].id`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

fn bullets(errors: &[ValidationError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
    lines.join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imunode")
        .join("sim.toml")
}
