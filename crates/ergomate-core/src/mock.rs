//! Mock transport for testing without BLE hardware.
//!
//! [`MockTransport`] implements [`DeskTransport`] entirely in memory: writes
//! are recorded, notifications are pushed by the test, and link loss is
//! simulated with [`drop_link`](MockTransport::drop_link). Failure injection
//! covers the open and write paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{DeskTransport, LinkDropReceiver, NotificationHandler};

/// In-memory [`DeskTransport`] with failure injection.
pub struct MockTransport {
    open: AtomicBool,
    open_count: AtomicUsize,
    /// Number of upcoming `open` calls that should fail.
    fail_opens: AtomicUsize,
    /// Number of upcoming `open` calls that should hang until cancelled.
    hang_opens: AtomicUsize,
    fail_writes: AtomicBool,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    handlers: Mutex<HashMap<Uuid, NotificationHandler>>,
    link_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open", &self.open.load(Ordering::SeqCst))
            .field("open_count", &self.open_count.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a closed mock transport.
    pub fn new() -> Self {
        let (link_tx, _) = broadcast::channel(8);
        Self {
            open: AtomicBool::new(false),
            open_count: AtomicUsize::new(0),
            fail_opens: AtomicUsize::new(0),
            hang_opens: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            link_tx,
        }
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `open` hang until the caller gives up.
    ///
    /// Simulates a peripheral in range but never completing the GATT
    /// handshake; the hung future only resolves by being dropped.
    pub fn hang_next_opens(&self, count: usize) {
        self.hang_opens.store(count, Ordering::SeqCst);
    }

    /// Make all writes fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Total number of `open` calls, successful or not.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// All frames written so far, in order.
    pub fn written_frames(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().expect("writes lock poisoned").clone()
    }

    /// Payloads written to `characteristic`, in order.
    pub fn frames_for(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .expect("writes lock poisoned")
            .iter()
            .filter(|(uuid, _)| *uuid == characteristic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Forget all recorded writes.
    pub fn clear_writes(&self) {
        self.writes.lock().expect("writes lock poisoned").clear();
    }

    /// Whether a handler is registered for `characteristic`.
    pub fn is_subscribed(&self, characteristic: Uuid) -> bool {
        self.handlers
            .lock()
            .expect("handlers lock poisoned")
            .contains_key(&characteristic)
    }

    /// Deliver a notification payload as if the desk had sent it.
    ///
    /// No-op when nothing is subscribed to `characteristic`.
    pub fn push_notification(&self, characteristic: Uuid, payload: &[u8]) {
        let handler = self
            .handlers
            .lock()
            .expect("handlers lock poisoned")
            .get(&characteristic)
            .cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    /// Simulate link loss: the transport closes and a link-drop fires.
    pub fn drop_link(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.handlers
            .lock()
            .expect("handlers lock poisoned")
            .clear();
        let _ = self.link_tx.send(());
    }
}

#[async_trait]
impl DeskTransport for MockTransport {
    async fn open(&self) -> Result<()> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let hanging = self.hang_opens.load(Ordering::SeqCst);
        if hanging > 0 {
            self.hang_opens.store(hanging - 1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        let remaining = self.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::connection_failed(
                None,
                ConnectionFailureReason::Other("injected open failure".to_string()),
            ));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.handlers
            .lock()
            .expect("handlers lock poisoned")
            .clear();
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::write_failed(
                characteristic.to_string(),
                "injected write failure",
            ));
        }
        self.writes
            .lock()
            .expect("writes lock poisoned")
            .push((characteristic, payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.handlers
            .lock()
            .expect("handlers lock poisoned")
            .insert(characteristic, handler);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.handlers
            .lock()
            .expect("handlers lock poisoned")
            .remove(&characteristic);
        Ok(())
    }

    fn link_drops(&self) -> LinkDropReceiver {
        self.link_tx.subscribe()
    }
}

/// Generate a plausible random mock BLE address for tests.
pub fn random_mock_address() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 6] = rng.random();
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}
