//! Error types for data parsing in bluepool-types.

use thiserror::Error;

/// Errors that can occur when parsing probe telemetry frames.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in bluepool-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The notification frame is too short to hold every sensor field.
    #[error("malformed frame: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum usable frame length.
        expected: usize,
        /// Actual payload length received.
        actual: usize,
    },
}

/// Result type alias using bluepool-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
