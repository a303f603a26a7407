//! Error types for wire decoding in imunode-types.

use thiserror::Error;

/// Errors that can occur when decoding frames or commands from raw bytes.
///
/// This error type is transport-agnostic and does not include link-level
/// errors (those belong in imunode-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Fewer bytes than the smallest accepted layout.
    #[error("Insufficient bytes: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes provided.
        actual: usize,
    },

    /// The payload length matches none of the accepted layouts.
    #[error("Invalid length: {actual} bytes is not one of {accepted:?}")]
    InvalidLength {
        /// Lengths the decoder accepts.
        accepted: &'static [usize],
        /// Number of bytes provided.
        actual: usize,
    },

    /// A field holds a value outside its domain.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using imunode-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
