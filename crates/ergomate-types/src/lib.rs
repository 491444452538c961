//! Platform-agnostic protocol types for ErgoMate standing desks.
//!
//! This crate holds everything about the ErgoMate Classic BLE protocol that
//! does not touch a radio: the frame codec, the UUID constants, and the data
//! model shared by driver and adapter code.
//!
//! # Wire protocol
//!
//! | Frame | Size | Layout |
//! |-------|------|--------|
//! | Motor command | 5 bytes | `[0xA5, 0x00, CMD, 0xFF ^ CMD, 0xFF]` |
//! | Absolute height | 9 bytes | `[0xA6, 0xA8, 0x01, HB, LB, 0x00, 0x00, checksum, 0xFF]` |
//! | Height notification | 4 bytes | ASCII decimal millimeters, e.g. `b"0720"` |
//!
//! # Example
//!
//! ```
//! use ergomate_types::frame::{MotorCommand, encode_motor_command, decode_height_notification};
//!
//! let frame = encode_motor_command(MotorCommand::Up);
//! assert_eq!(frame, [0xA5, 0x00, 0x20, 0xDF, 0xFF]);
//!
//! let height_mm = decode_height_notification(b"0720").unwrap();
//! assert_eq!(height_mm, 720);
//! ```

pub mod error;
pub mod frame;
pub mod types;
pub mod uuid;

pub use error::{CodecError, CodecResult, MalformedReason};
pub use frame::{MotorCommand, decode_height_notification, encode_height_command, encode_motor_command};
pub use types::{
    ConnectionStatus, HeightReading, MAX_HEIGHT_CM, MAX_HEIGHT_MM, MIN_HEIGHT_CM, MIN_HEIGHT_MM,
};
pub use self::uuid as uuids;
