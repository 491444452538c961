//! Async BLE client for ErgoMate motorized standing desks.
//!
//! This crate drives the desk's proprietary GATT protocol over
//! [btleplug](https://docs.rs/btleplug): confirmed motor and preset-height
//! commands, live height notifications, automatic reconnection with
//! exponential backoff, and a height calibration offset.
//!
//! # Example
//!
//! ```no_run
//! use ergomate_core::{Desk, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let desk = Desk::new("AA:BB:CC:DD:EE:FF", 0.0);
//!     desk.connect().await?;
//!     desk.subscribe_notifications().await?;
//!
//!     desk.move_to_height(110.0).await?;
//!     tokio::time::sleep(Duration::from_secs(15)).await;
//!     if let Some(cm) = desk.calibrated_height_cm() {
//!         println!("Desk is at {:.1} cm", cm);
//!     }
//!
//!     desk.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Desk`] is the public surface: connection lifecycle, commands, and
//! notification subscriptions. It talks to the radio through the
//! [`DeskTransport`] trait, implemented by [`BleTransport`] for real hardware
//! and [`mock::MockTransport`] for tests. Height payloads flow through the
//! notification router, which validates them and fans accepted readings out
//! to registered observers and the event stream.

pub mod ble;
pub mod desk;
pub mod error;
pub mod events;
pub mod mock;
pub mod observers;
pub mod reconnect;
pub mod router;
pub mod scan;
pub mod transport;

pub use ble::BleTransport;
pub use desk::{ConnectionConfig, Desk};
pub use error::{ConnectionFailureReason, Error, Result, UnsupportedFeature};
pub use events::{DeskEvent, DisconnectReason, EventReceiver};
pub use observers::{HeightObserver, ObserverHandle};
pub use reconnect::ReconnectOptions;
pub use scan::{DiscoveredDesk, ScanOptions, scan_for_desks, scan_with_options};
pub use transport::{DeskTransport, NotificationHandler};

// Re-export the protocol types so callers rarely need ergomate-types directly.
pub use ergomate_types::frame::MotorCommand;
pub use ergomate_types::{
    ConnectionStatus, HeightReading, MAX_HEIGHT_CM, MIN_HEIGHT_CM, uuids,
};
