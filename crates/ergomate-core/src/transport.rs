//! Transport capability required by the desk driver.
//!
//! The driver never touches a radio directly; everything it needs from one is
//! expressed by the [`DeskTransport`] trait. [`BleTransport`](crate::ble::BleTransport)
//! backs it with btleplug for real hardware, and
//! [`MockTransport`](crate::mock::MockTransport) backs it for tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// Callback invoked with each raw notification payload.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Receiver fired (with no payload) on unexpected link loss.
///
/// A deliberate [`DeskTransport::close`] does not fire it.
pub type LinkDropReceiver = broadcast::Receiver<()>;

/// Abstract BLE link to one desk.
///
/// Implementations identify the remote peripheral by an address fixed at
/// construction; `open` may be called again after the link drops.
#[async_trait]
pub trait DeskTransport: Send + Sync {
    /// Open the link to the peripheral. A no-op when already open.
    async fn open(&self) -> Result<()>;

    /// Close the link and release radio resources.
    async fn close(&self) -> Result<()>;

    /// Whether the link is currently open.
    async fn is_open(&self) -> bool;

    /// Write a payload to a characteristic with confirmed delivery.
    ///
    /// The desk firmware silently drops unacknowledged writes, so
    /// implementations must always request a write response; fire-and-forget
    /// writes are a contract violation.
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()>;

    /// Subscribe to notifications on a characteristic.
    ///
    /// The handler is invoked for every notification until `unsubscribe` is
    /// called or the link drops.
    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()>;

    /// Stop notification delivery for a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Subscribe to unexpected link-loss signals.
    fn link_drops(&self) -> LinkDropReceiver;
}
