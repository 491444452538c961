//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Errors produced by the frame codec.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Height is outside the protocol's representable range.
    #[error("height {height_mm} mm is outside the supported range {min_mm}-{max_mm} mm")]
    OutOfRange {
        /// The rejected height in millimeters.
        height_mm: u16,
        /// Lower bound of the supported range.
        min_mm: u16,
        /// Upper bound of the supported range.
        max_mm: u16,
    },

    /// A height notification payload could not be decoded.
    #[error("malformed height notification: {reason} (payload: {payload:02X?})")]
    MalformedNotification {
        /// Why decoding failed.
        reason: MalformedReason,
        /// The raw payload, for diagnostics.
        payload: Vec<u8>,
    },
}

/// Why a height notification payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Payload length was not exactly 4 bytes.
    WrongLength(usize),
    /// Payload contained a byte outside ASCII '0'-'9'.
    NonDigitByte(u8),
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongLength(len) => write!(f, "expected 4 bytes, got {}", len),
            Self::NonDigitByte(byte) => write!(f, "non-digit byte 0x{:02X}", byte),
        }
    }
}

/// Result type alias for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;
