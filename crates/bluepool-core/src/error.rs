//! Error types for bluepool-core.
//!
//! This module defines all error types that can occur when communicating
//! with a Blue Connect Go probe via Bluetooth Low Energy.
//!
//! Not everything that goes wrong during an update cycle is an error here:
//! a missed notification (the probe is a flaky low-power peripheral) and a
//! chlorine derivation fault are absorbed into absent snapshot fields by
//! the session rather than propagated. Only failures that mean the cycle
//! produced no usable data — connect failures and malformed frames — reach
//! the caller.

use std::time::Duration;

use thiserror::Error;

use bluepool_types::ParseError;

/// Errors that can occur when communicating with a probe.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Connection to the probe could not be established.
    #[error("connection failed: {reason}")]
    ConnectFailed {
        /// The device address that failed to connect, when known.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectFailureReason,
    },

    /// The notification frame violated the wire format.
    #[error("malformed frame: requires {expected} bytes, got {actual}")]
    MalformedFrame {
        /// Minimum usable frame length.
        expected: usize,
        /// Actual payload length received.
        actual: usize,
    },

    /// Operation attempted while not connected to the probe.
    #[error("not connected to probe")]
    NotConnected,

    /// Required BLE characteristic not found on the probe.
    #[error("characteristic not found: {uuid} (searched {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Write operation failed.
    #[error("write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// An update was requested while a session for the same probe is
    /// still outstanding. Sessions are serialized, never interleaved;
    /// the caller must wait for the previous cycle to finish.
    #[error("session already in progress for {address}")]
    SessionInProgress {
        /// The device address with the outstanding session.
        address: String,
    },
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// The address is not known to the adapter (probe not in range or
    /// never discovered by the host).
    UnknownDevice,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::UnknownDevice => write!(f, "device not known to the adapter"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a connection failure with structured reason.
    pub fn connect_failed(device_id: Option<String>, reason: ConnectFailureReason) -> Self {
        Self::ConnectFailed { device_id, reason }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a session-in-progress error.
    pub fn session_in_progress(address: impl Into<String>) -> Self {
        Self::SessionInProgress {
            address: address.into(),
        }
    }

    /// Whether retrying the operation could plausibly succeed.
    ///
    /// Used by the transport's connect-retry loop. Structural failures
    /// (malformed frames, missing characteristics) are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Bluetooth(_) | Error::ConnectFailed { .. } | Error::Timeout { .. }
        )
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InsufficientBytes { expected, actual } => {
                Error::MalformedFrame { expected, actual }
            }
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::MalformedFrame {
                expected: bluepool_types::MIN_FRAME_LEN,
                actual: 0,
            },
        }
    }
}

/// Result type alias using bluepool-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
