//! Frame codec for the ErgoMate BLE protocol.
//!
//! The desk speaks two outbound frame formats and one inbound one:
//!
//! - **Motor frames** (5 bytes): continuous up/down movement and stop.
//! - **Height frames** (9 bytes): move to an absolute height in millimeters.
//! - **Height notifications** (4 bytes): the current height as ASCII decimal
//!   digits, e.g. `b"0720"` for 720 mm.
//!
//! All functions here are pure; range policy beyond the wire format (what to do
//! with an implausible but well-formed height) belongs to the driver.

use crate::error::{CodecError, CodecResult, MalformedReason};
use crate::types::{MAX_HEIGHT_MM, MIN_HEIGHT_MM};

/// Motor frame header byte.
pub const MOTOR_FRAME_HEADER: u8 = 0xA5;

/// Reserved byte, always zero.
pub const MOTOR_FRAME_RESERVED: u8 = 0x00;

/// Frame terminator byte, shared by both frame formats.
pub const FRAME_TERMINATOR: u8 = 0xFF;

/// Height frame header byte.
pub const HEIGHT_FRAME_HEADER: u8 = 0xA6;

/// Height frame command byte.
pub const HEIGHT_FRAME_COMMAND: u8 = 0xA8;

/// Height frame fixed parameter byte.
pub const HEIGHT_FRAME_PARAM: u8 = 0x01;

/// Size of a motor command frame.
pub const MOTOR_FRAME_LEN: usize = 5;

/// Size of an absolute-height command frame.
pub const HEIGHT_FRAME_LEN: usize = 9;

/// Size of a height notification payload.
pub const NOTIFICATION_LEN: usize = 4;

/// Motor movement commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotorCommand {
    /// Move the desk up until stopped or max height is reached.
    Up = 0x20,
    /// Move the desk down until stopped or min height is reached.
    Down = 0x40,
    /// Stop movement.
    Stop = 0x00,
}

impl MotorCommand {
    /// The on-wire command byte.
    #[must_use]
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotorCommand::Up => write!(f, "up"),
            MotorCommand::Down => write!(f, "down"),
            MotorCommand::Stop => write!(f, "stop"),
        }
    }
}

/// Encode a motor command into a 5-byte frame.
///
/// Frame layout: `[0xA5, 0x00, CMD, 0xFF ^ CMD, 0xFF]`. The checksum is
/// the terminator XOR'd with the command byte.
///
/// # Examples
///
/// ```
/// use ergomate_types::frame::{MotorCommand, encode_motor_command};
///
/// assert_eq!(encode_motor_command(MotorCommand::Up), [0xA5, 0x00, 0x20, 0xDF, 0xFF]);
/// ```
#[must_use]
pub fn encode_motor_command(cmd: MotorCommand) -> [u8; MOTOR_FRAME_LEN] {
    let cmd_byte = cmd.byte();
    let checksum = FRAME_TERMINATOR ^ cmd_byte;
    [
        MOTOR_FRAME_HEADER,
        MOTOR_FRAME_RESERVED,
        cmd_byte,
        checksum,
        FRAME_TERMINATOR,
    ]
}

/// Encode an absolute-height command into a 9-byte frame.
///
/// Frame layout: `[0xA6, 0xA8, 0x01, HB, LB, 0x00, 0x00, checksum, 0xFF]`
/// where `HB`/`LB` are the big-endian bytes of the height in millimeters and
/// the checksum is the XOR of the param byte, the height bytes, and the two
/// zero padding bytes. The command byte is not part of the checksum.
///
/// # Errors
///
/// Returns [`CodecError::OutOfRange`] if `height_mm` is outside the
/// firmware-enforced physical range of 650-1300 mm. Callers that accept
/// user-facing heights are expected to clamp before reaching the codec.
pub fn encode_height_command(height_mm: u16) -> CodecResult<[u8; HEIGHT_FRAME_LEN]> {
    if !(MIN_HEIGHT_MM..=MAX_HEIGHT_MM).contains(&height_mm) {
        return Err(CodecError::OutOfRange {
            height_mm,
            min_mm: MIN_HEIGHT_MM,
            max_mm: MAX_HEIGHT_MM,
        });
    }

    let high_byte = (height_mm >> 8) as u8;
    let low_byte = (height_mm & 0xFF) as u8;
    let zero1 = 0x00;
    let zero2 = 0x00;
    let checksum = HEIGHT_FRAME_PARAM ^ high_byte ^ low_byte ^ zero1 ^ zero2;

    Ok([
        HEIGHT_FRAME_HEADER,
        HEIGHT_FRAME_COMMAND,
        HEIGHT_FRAME_PARAM,
        high_byte,
        low_byte,
        zero1,
        zero2,
        checksum,
        FRAME_TERMINATOR,
    ])
}

/// Decode a height notification payload into millimeters.
///
/// The desk reports its height as exactly four ASCII decimal digits, big-endian
/// decimal, e.g. `b"0720"` for 720 mm. Leading zeros are permitted.
///
/// This does not enforce the physical 650-1300 mm range: a torn or corrupted
/// notification can still parse as valid digits, so plausibility is the
/// consumer's call.
///
/// # Errors
///
/// Returns [`CodecError::MalformedNotification`] if the payload is not exactly
/// 4 bytes or contains a non-digit byte.
pub fn decode_height_notification(payload: &[u8]) -> CodecResult<u16> {
    if payload.len() != NOTIFICATION_LEN {
        return Err(CodecError::MalformedNotification {
            reason: MalformedReason::WrongLength(payload.len()),
            payload: payload.to_vec(),
        });
    }

    let mut height_mm: u16 = 0;
    for &byte in payload {
        if !byte.is_ascii_digit() {
            return Err(CodecError::MalformedNotification {
                reason: MalformedReason::NonDigitByte(byte),
                payload: payload.to_vec(),
            });
        }
        height_mm = height_mm * 10 + u16::from(byte - b'0');
    }

    Ok(height_mm)
}
