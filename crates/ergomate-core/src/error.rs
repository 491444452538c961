//! Error types for ergomate-core.
//!
//! This module defines all error types that can occur when driving an
//! ErgoMate desk over Bluetooth Low Energy.
//!
//! # Propagation policy
//!
//! Errors from `connect`, command operations, and subscribe/unsubscribe are
//! reported synchronously to the caller. Errors from autonomous background
//! activity (reconnect attempts, notification decoding) are never thrown at a
//! caller; they are observable only through connection-status transitions and
//! [`DeskEvent`](crate::events::DeskEvent) diagnostics.
//!
//! # Retry vs reconnect
//!
//! | Error | Strategy |
//! |-------|----------|
//! | [`Error::Timeout`] | Retry the operation; BLE round trips stall under congestion |
//! | [`Error::WriteFailed`] | Retry once or twice; does not by itself mean the link dropped |
//! | [`Error::NotConnected`] | Call `connect()` again |
//! | [`Error::ConnectionFailed`] | Retry with backoff; the desk may be busy or out of range |
//! | [`Error::Codec`] | Do not retry; a driver bug if reached through the public surface |
//! | [`Error::Unsupported`] | Do not retry; the feature is unreachable over BLE |

use std::time::Duration;

use thiserror::Error;

use ergomate_types::CodecError;

/// Errors that can occur when communicating with an ErgoMate desk.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The transport could not be opened.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The desk address that failed to connect.
        address: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Operation attempted while not connected to the desk.
    #[error("Not connected to desk")]
    NotConnected,

    /// Required BLE characteristic not found on the desk.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A confirmed write failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Frame codec error.
    ///
    /// Unreachable through the public command surface: the dispatcher clamps
    /// heights before they reach the codec, so seeing this indicates an
    /// internal invariant failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The requested feature is cloud-only and unreachable over BLE.
    #[error("{0} is not available over BLE: {reason}", reason = .0.explanation())]
    Unsupported(UnsupportedFeature),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Desk not found during the discovery scan.
    NotFound,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::NotFound => write!(f, "desk not found"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Desk features implemented in the vendor app through its cloud API.
///
/// The vendor app performs these over WiFi via its cloud backend; the desk
/// never accepts them on the BLE command characteristic, so this driver
/// refuses them up front instead of writing frames the firmware would drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedFeature {
    /// Audible beep.
    Beep,
    /// Child lock (disable the physical buttons).
    ChildLock,
    /// Factory reset of the desk controller.
    FactoryReset,
}

impl UnsupportedFeature {
    fn explanation(&self) -> &'static str {
        "the vendor app performs this through its cloud API over WiFi, \
         and no BLE command for it exists"
    }
}

impl std::fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beep => write!(f, "beep"),
            Self::ChildLock => write!(f, "child lock"),
            Self::FactoryReset => write!(f, "factory reset"),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(address: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { address, reason }
    }

    /// Create a write failure for a characteristic.
    pub fn write_failed(uuid: impl ToString, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            uuid: uuid.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a characteristic-not-found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }
}

/// Result type alias using ergomate-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
