//! Bluetooth UUIDs for ErgoMate Classic desks.
//!
//! These were captured from the vendor app's GATT traffic. Classic desks
//! expose a single custom service with a write characteristic for commands
//! and a notify characteristic for height updates.

use uuid::{Uuid, uuid};

/// ErgoMate Classic desk control service.
pub const DESK_SERVICE: Uuid = uuid!("0000ff00-0000-1000-8000-00805f9b34fb");

/// Command characteristic; all outbound frames are written here.
pub const WRITE_CHARACTERISTIC: Uuid = uuid!("0000ff02-0000-1000-8000-00805f9b34fb");

/// Height notification characteristic.
pub const NOTIFY_CHARACTERISTIC: Uuid = uuid!("0000ff01-0000-1000-8000-00805f9b34fb");

// Present on the desk but never written by the vendor app's BLE path.
// Possibly WiFi provisioning; payload format not captured.

/// Undocumented characteristic, purpose unknown.
pub const CHAR_B002: Uuid = uuid!("0000b002-0000-1000-8000-00805f9b34fb");

/// Undocumented characteristic, purpose unknown.
pub const CHAR_B003: Uuid = uuid!("0000b003-0000-1000-8000-00805f9b34fb");

/// Advertised name prefix of ErgoMate Classic desks.
pub const DEVICE_NAME_PREFIX: &str = "BLT_";
