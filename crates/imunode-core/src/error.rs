//! Error types for imunode-core.
//!
//! # Error Classes
//!
//! Node errors fall into four classes, each with a fixed handling policy.
//!
//! | Class | Variants | Policy |
//! |-------|----------|--------|
//! | Fatal at startup | [`Error::SensorInit`], [`Error::TransportInit`] | Abort startup, no recovery |
//! | Fatal in steady state | [`Error::Sensor`] | End the run; the caller restarts the node |
//! | Recoverable transport | [`Error::Transport`], [`Error::NotConnected`] | Log and continue (drop the frame or re-advertise) |
//! | Malformed command | [`Error::Parse`] from [`decode`](crate::protocol::decode) | Write ignored, never surfaced to the peer |
//!
//! [`Error::InvalidConfig`] is reported before the node starts and
//! [`Error::Cancelled`] only when the caller tears the node down.

use thiserror::Error;

/// Errors that can occur while running a sensor node.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The sensor could not be brought up.
    #[error("Sensor initialization failed: {0}")]
    SensorInit(String),

    /// The wireless stack could not be brought up.
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// A sensor read failed after startup.
    #[error("Sensor read failed: {0}")]
    Sensor(String),

    /// A transport operation failed.
    #[error("Transport error during {operation}: {reason}")]
    Transport {
        /// The operation that failed.
        operation: &'static str,
        /// The reason reported by the link layer.
        reason: String,
    },

    /// Operation attempted without a connected peer.
    #[error("No peer connected")]
    NotConnected,

    /// Failed to decode data received from the peer.
    #[error(transparent)]
    Parse(#[from] imunode_types::ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The node was torn down by its owner.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a sensor read error.
    pub fn sensor(reason: impl Into<String>) -> Self {
        Self::Sensor(reason.into())
    }

    /// Create a sensor initialization error.
    pub fn sensor_init(reason: impl Into<String>) -> Self {
        Self::SensorInit(reason.into())
    }

    /// Create a transport error for a named operation.
    pub fn transport(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the node must stop when this error occurs.
    ///
    /// Transport failures and malformed input are recoverable; everything
    /// else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Transport { .. } | Error::NotConnected | Error::Parse(_)
        )
    }
}

/// Result type alias using imunode-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::sensor("i2c timeout");
        assert_eq!(err.to_string(), "Sensor read failed: i2c timeout");

        let err = Error::transport("notify", "not subscribed");
        assert!(err.to_string().contains("notify"));
        assert!(err.to_string().contains("not subscribed"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "No peer connected");

        let err = Error::invalid_config("interval must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: interval must be > 0"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::sensor("bus").is_fatal());
        assert!(Error::sensor_init("who-am-i mismatch").is_fatal());
        assert!(Error::TransportInit("no controller".into()).is_fatal());
        assert!(!Error::transport("notify", "busy").is_fatal());
        assert!(!Error::NotConnected.is_fatal());
    }

    #[test]
    fn test_parse_error_conversion() {
        let parse = imunode_types::ParseError::InsufficientBytes {
            expected: 4,
            actual: 1,
        };
        let err: Error = parse.into();
        assert!(matches!(err, Error::Parse(_)));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("requires 4 bytes"));
    }
}
