//! Core types for the ErgoMate desk driver.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum firmware-enforced desk height in millimeters.
pub const MIN_HEIGHT_MM: u16 = 650;

/// Maximum firmware-enforced desk height in millimeters.
pub const MAX_HEIGHT_MM: u16 = 1300;

/// Minimum desk height in centimeters, for user-facing requests.
pub const MIN_HEIGHT_CM: f32 = 65.0;

/// Maximum desk height in centimeters, for user-facing requests.
pub const MAX_HEIGHT_CM: f32 = 130.0;

/// Connection status of a desk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionStatus {
    /// No transport link is open.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport link is open and usable.
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// The most recently observed desk height.
///
/// `raw_mm` is the value decoded straight from a height notification; the
/// calibration offset is applied only to the [`calibrated_cm`](Self::calibrated_cm)
/// accessor, never to the raw value and never to outbound height commands.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightReading {
    /// Height in millimeters as reported by the desk.
    pub raw_mm: u16,
    /// Calibration offset in centimeters, applied to the calibrated accessor.
    pub offset_cm: f32,
}

impl HeightReading {
    /// Create a reading with no calibration offset.
    #[must_use]
    pub fn new(raw_mm: u16) -> Self {
        Self {
            raw_mm,
            offset_cm: 0.0,
        }
    }

    /// Create a reading carrying a calibration offset.
    #[must_use]
    pub fn with_offset(raw_mm: u16, offset_cm: f32) -> Self {
        Self { raw_mm, offset_cm }
    }

    /// The uncalibrated height in centimeters (raw millimeters / 10).
    #[must_use]
    pub fn raw_cm(&self) -> f32 {
        f32::from(self.raw_mm) / 10.0
    }

    /// The calibrated height in centimeters (raw cm + offset).
    #[must_use]
    pub fn calibrated_cm(&self) -> f32 {
        self.raw_cm() + self.offset_cm
    }

    /// Whether the raw value lies within the firmware-enforced physical range.
    #[must_use]
    pub fn is_plausible(&self) -> bool {
        (MIN_HEIGHT_MM..=MAX_HEIGHT_MM).contains(&self.raw_mm)
    }
}

impl fmt::Display for HeightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} cm", self.calibrated_cm())
    }
}
