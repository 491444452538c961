//! Desk connection and command dispatch.
//!
//! [`Desk`] owns one logical session to a physical desk: the connection state
//! machine, the reconnect supervisor, the serialized command path, and the
//! notification subscription. It drives the radio only through the
//! [`DeskTransport`] capability, so the same code runs against real hardware
//! and the mock transport in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ergomate_types::frame::{MotorCommand, encode_height_command, encode_motor_command};
use ergomate_types::uuid::{NOTIFY_CHARACTERISTIC, WRITE_CHARACTERISTIC};
use ergomate_types::{ConnectionStatus, HeightReading, MAX_HEIGHT_CM, MIN_HEIGHT_CM};

use crate::ble::BleTransport;
use crate::error::{Error, Result, UnsupportedFeature};
use crate::events::{DeskEvent, DisconnectReason, EventDispatcher, EventReceiver};
use crate::observers::{HeightObserver, ObserverHandle};
use crate::reconnect::{ReconnectOptions, SupervisorContext, run_supervisor};
use crate::router::NotificationRouter;
use crate::transport::{DeskTransport, LinkDropReceiver};

/// Default timeout for establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a confirmed characteristic write.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for connection timeouts and reconnection behavior.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for confirmed writes and subscription changes.
    pub write_timeout: Duration,
    /// Backoff policy for the reconnect supervisor.
    pub reconnect: ReconnectOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            reconnect: ReconnectOptions::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the reconnect backoff policy.
    #[must_use]
    pub fn reconnect(mut self, options: ReconnectOptions) -> Self {
        self.reconnect = options;
        self
    }
}

/// Running reconnect supervisor, owned by the desk.
struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A session to one ErgoMate desk.
///
/// # Note on Clone
///
/// This struct intentionally does not implement `Clone`; a `Desk` represents
/// an active session with associated background tasks. Share it across tasks
/// as `Arc<Desk>`.
///
/// # Cleanup
///
/// Call [`Desk::disconnect`] before dropping the desk so the reconnect
/// supervisor stops and the BLE link is released; dropping without it logs a
/// warning and aborts the supervisor without the safety stop.
pub struct Desk {
    address: String,
    config: ConnectionConfig,
    transport: Arc<dyn DeskTransport>,
    status: Arc<RwLock<ConnectionStatus>>,
    router: Arc<NotificationRouter>,
    events: EventDispatcher,
    /// True while a notifications subscription is active.
    subscribed: Arc<AtomicBool>,
    /// True after an up/down/move-to command until a stop or link loss.
    moving: Arc<AtomicBool>,
    /// Monotonic command counter; deferred stops fire only when still newest.
    command_seq: AtomicU64,
    /// Coalesces concurrent connect() callers onto one attempt.
    connect_lock: Mutex<()>,
    /// Serializes characteristic writes; the firmware handles one at a time.
    write_lock: Mutex<()>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl std::fmt::Debug for Desk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desk")
            .field("address", &self.address)
            .field("status", &self.status())
            .field("height_offset_cm", &self.router.offset_cm())
            .field("moving", &self.is_moving())
            .finish_non_exhaustive()
    }
}

impl Desk {
    /// Create a desk session over real BLE hardware.
    ///
    /// `height_offset_cm` calibrates reported heights against the desk's own
    /// control-panel display; it never affects outbound commands. No radio
    /// I/O happens until [`connect`](Self::connect).
    pub fn new(address: impl Into<String>, height_offset_cm: f32) -> Self {
        let address = address.into();
        let transport = Arc::new(BleTransport::new(address.clone()));
        Self::with_transport(address, height_offset_cm, transport, ConnectionConfig::default())
    }

    /// Create a desk session over an arbitrary transport.
    ///
    /// This is the seam used by tests (with
    /// [`MockTransport`](crate::mock::MockTransport)) and by adapters that
    /// manage their own radio.
    pub fn with_transport(
        address: impl Into<String>,
        height_offset_cm: f32,
        transport: Arc<dyn DeskTransport>,
        config: ConnectionConfig,
    ) -> Self {
        let events = EventDispatcher::default();
        Self {
            address: address.into(),
            config,
            transport,
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            router: Arc::new(NotificationRouter::new(height_offset_cm, events.clone())),
            events,
            subscribed: Arc::new(AtomicBool::new(false)),
            moving: Arc::new(AtomicBool::new(false)),
            command_seq: AtomicU64::new(0),
            connect_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            supervisor: Mutex::new(None),
        }
    }

    // --- Accessors ---

    /// The desk's BLE address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The calibration offset in centimeters.
    pub fn height_offset_cm(&self) -> f32 {
        self.router.offset_cm()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// The most recently accepted height reading, if any.
    pub fn current_reading(&self) -> Option<HeightReading> {
        self.router.current_reading()
    }

    /// Uncalibrated height in centimeters, if a reading has arrived.
    pub fn raw_height_cm(&self) -> Option<f32> {
        self.current_reading().map(|r| r.raw_cm())
    }

    /// Calibrated height in centimeters, if a reading has arrived.
    pub fn calibrated_height_cm(&self) -> Option<f32> {
        self.current_reading().map(|r| r.calibrated_cm())
    }

    /// Whether a motor command has been issued without a stop since.
    ///
    /// Derived state; the desk does not report motion itself.
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    /// Subscribe to connection and diagnostic events.
    pub fn events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().expect("status lock poisoned") = status;
    }

    // --- Connection lifecycle ---

    /// Connect to the desk.
    ///
    /// Idempotent: a no-op when already connected, and a caller arriving while
    /// an attempt is in flight waits for that attempt instead of starting a
    /// second one. On success the reconnect supervisor is armed for link loss.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when the configured connect timeout elapses,
    /// [`Error::ConnectionFailed`] (or another transport error) when the
    /// transport reports failure. Either way the status is `Disconnected`
    /// when this returns.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        if self.status() == ConnectionStatus::Connected && self.transport.is_open().await {
            debug!("Already connected");
            return Ok(());
        }

        self.set_status(ConnectionStatus::Connecting);
        // Subscribed before the open: a drop landing between the open
        // succeeding and the supervisor's first poll must not be lost.
        let drops = self.transport.link_drops();
        match timeout(self.config.connect_timeout, self.transport.open()).await {
            Ok(Ok(())) => {
                self.set_status(ConnectionStatus::Connected);
                self.events.send(DeskEvent::Connected {
                    address: self.address.clone(),
                });
                self.ensure_supervisor(drops).await;
                info!("Connected to desk");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
            Err(_) => {
                self.set_status(ConnectionStatus::Disconnected);
                Err(Error::timeout("connect", self.config.connect_timeout))
            }
        }
    }

    /// Disconnect from the desk and tear the session down.
    ///
    /// Cancels the reconnect supervisor and waits until it has observably
    /// stopped, sends a best-effort Stop (the desk should not keep moving
    /// with nobody in control; a failure here is logged and ignored), then
    /// unsubscribes notifications and closes the transport.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            supervisor.cancel.cancel();
            let _ = supervisor.handle.await;
        }

        if self.transport.is_open().await {
            let frame = encode_motor_command(MotorCommand::Stop);
            match timeout(
                self.config.write_timeout,
                self.transport.write(WRITE_CHARACTERISTIC, &frame),
            )
            .await
            {
                Ok(Ok(())) => debug!("Sent stop before disconnect"),
                Ok(Err(e)) => warn!("Failed to stop desk before disconnect: {}", e),
                Err(_) => warn!("Stop before disconnect timed out"),
            }

            if self.subscribed.swap(false, Ordering::SeqCst)
                && let Err(e) = self.transport.unsubscribe(NOTIFY_CHARACTERISTIC).await
            {
                warn!("Error unsubscribing during disconnect: {}", e);
            }
        } else {
            self.subscribed.store(false, Ordering::SeqCst);
        }

        self.moving.store(false, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Disconnected);
        self.events.send(DeskEvent::Disconnected {
            address: self.address.clone(),
            reason: DisconnectReason::UserRequested,
        });

        self.transport.close().await?;
        info!("Disconnected from desk");
        Ok(())
    }

    /// Spawn the reconnect supervisor unless one is already running.
    async fn ensure_supervisor(&self, drops: LinkDropReceiver) {
        let mut slot = self.supervisor.lock().await;
        if let Some(supervisor) = slot.as_ref()
            && !supervisor.handle.is_finished()
        {
            return;
        }

        let cancel = CancellationToken::new();
        let ctx = SupervisorContext {
            address: self.address.clone(),
            transport: Arc::clone(&self.transport),
            status: Arc::clone(&self.status),
            router: Arc::clone(&self.router),
            subscribed: Arc::clone(&self.subscribed),
            moving: Arc::clone(&self.moving),
            events: self.events.clone(),
            options: self.config.reconnect.clone(),
            connect_timeout: self.config.connect_timeout,
        };
        let handle = tokio::spawn(run_supervisor(ctx, cancel.clone(), drops));
        *slot = Some(Supervisor { cancel, handle });
    }

    /// The single reconnect-before-send gate every command goes through.
    async fn ensure_connected(&self) -> Result<()> {
        if self.status() == ConnectionStatus::Connected && self.transport.is_open().await {
            return Ok(());
        }
        debug!("Not connected; attempting to connect before sending");
        self.connect().await
    }

    /// Transmit one frame with confirmed delivery, serialized per connection.
    async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        self.ensure_connected().await?;
        let _write_guard = self.write_lock.lock().await;
        timeout(
            self.config.write_timeout,
            self.transport.write(WRITE_CHARACTERISTIC, frame),
        )
        .await
        .map_err(|_| Error::timeout("write command", self.config.write_timeout))?
    }

    // --- Commands ---

    async fn motor(&self, cmd: MotorCommand) -> Result<u64> {
        let seq = self.command_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Sending {} command", cmd);
        self.send_frame(&encode_motor_command(cmd)).await?;
        self.moving
            .store(cmd != MotorCommand::Stop, Ordering::SeqCst);
        Ok(seq)
    }

    /// Move the desk up until stopped or it reaches max height.
    pub async fn move_up(&self) -> Result<()> {
        self.motor(MotorCommand::Up).await.map(drop)
    }

    /// Move the desk down until stopped or it reaches min height.
    pub async fn move_down(&self) -> Result<()> {
        self.motor(MotorCommand::Down).await.map(drop)
    }

    /// Stop desk movement.
    pub async fn stop(&self) -> Result<()> {
        self.motor(MotorCommand::Stop).await.map(drop)
    }

    /// Move the desk up for the given duration, then stop.
    ///
    /// The deferred stop is last-command-wins: if any other command is issued
    /// while waiting, the scheduled stop becomes a no-op. Suspends the caller
    /// for the full duration.
    pub async fn move_up_for(&self, duration: Duration) -> Result<()> {
        let seq = self.motor(MotorCommand::Up).await?;
        self.stop_after(seq, duration).await
    }

    /// Move the desk down for the given duration, then stop.
    ///
    /// Same last-command-wins semantics as [`move_up_for`](Self::move_up_for).
    pub async fn move_down_for(&self, duration: Duration) -> Result<()> {
        let seq = self.motor(MotorCommand::Down).await?;
        self.stop_after(seq, duration).await
    }

    async fn stop_after(&self, seq: u64, duration: Duration) -> Result<()> {
        sleep(duration).await;
        if self.command_seq.load(Ordering::SeqCst) != seq {
            debug!("Skipping scheduled stop; a later command supersedes it");
            return Ok(());
        }
        self.stop().await
    }

    /// Move the desk to an absolute height in centimeters.
    ///
    /// Heights outside 65.0-130.0 cm are clamped, not rejected: the firmware
    /// applies the same clamp itself, and clamping preserves intent for
    /// slightly-out-of-range requests. The codec's own millimeter range guard
    /// stays as the wire-level backstop and is unreachable from here.
    pub async fn move_to_height(&self, height_cm: f32) -> Result<()> {
        if !height_cm.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "target height must be finite, got {}",
                height_cm
            )));
        }

        let clamped = height_cm.clamp(MIN_HEIGHT_CM, MAX_HEIGHT_CM);
        if clamped != height_cm {
            warn!(
                "Requested height {:.1} cm outside {:.0}-{:.0} cm, clamping to {:.1} cm",
                height_cm, MIN_HEIGHT_CM, MAX_HEIGHT_CM, clamped
            );
        }

        let height_mm = (clamped * 10.0).round() as u16;
        let frame = encode_height_command(height_mm)?;

        self.command_seq.fetch_add(1, Ordering::SeqCst);
        debug!("Moving to height {:.1} cm ({} mm)", clamped, height_mm);
        self.send_frame(&frame).await?;
        self.moving.store(true, Ordering::SeqCst);
        Ok(())
    }

    // --- Notifications ---

    /// Subscribe to height notifications from the desk.
    ///
    /// Connects first if necessary. Accepted readings update
    /// [`current_reading`](Self::current_reading) and fan out to registered
    /// observers; malformed or implausible payloads are dropped with a
    /// diagnostic event.
    pub async fn subscribe_notifications(&self) -> Result<()> {
        self.ensure_connected().await?;
        let handler = self.router.handler();
        timeout(
            self.config.write_timeout,
            self.transport.subscribe(NOTIFY_CHARACTERISTIC, handler),
        )
        .await
        .map_err(|_| Error::timeout("subscribe notifications", self.config.write_timeout))??;
        self.subscribed.store(true, Ordering::SeqCst);
        debug!("Subscribed to height notifications");
        Ok(())
    }

    /// Stop height notification delivery.
    ///
    /// In-flight decodes complete; no further payloads are accepted.
    pub async fn unsubscribe_notifications(&self) -> Result<()> {
        self.subscribed.store(false, Ordering::SeqCst);
        if self.transport.is_open().await {
            self.transport.unsubscribe(NOTIFY_CHARACTERISTIC).await?;
        }
        debug!("Unsubscribed from height notifications");
        Ok(())
    }

    /// Register an observer invoked for every accepted height reading.
    pub fn register_callback(&self, observer: HeightObserver) -> ObserverHandle {
        self.router.register(observer)
    }

    /// Remove a previously registered observer.
    ///
    /// Returns `true` if the handle was registered.
    pub fn unregister_callback(&self, handle: ObserverHandle) -> bool {
        self.router.unregister(handle)
    }

    // --- Cloud-only features (unreachable over BLE) ---

    /// Audible beep. Cloud-only; always fails with [`Error::Unsupported`].
    pub async fn beep(&self, _duration: Duration) -> Result<()> {
        Err(Error::Unsupported(UnsupportedFeature::Beep))
    }

    /// Child lock. Cloud-only; always fails with [`Error::Unsupported`].
    pub async fn lock(&self) -> Result<()> {
        Err(Error::Unsupported(UnsupportedFeature::ChildLock))
    }

    /// Child unlock. Cloud-only; always fails with [`Error::Unsupported`].
    pub async fn unlock(&self) -> Result<()> {
        Err(Error::Unsupported(UnsupportedFeature::ChildLock))
    }

    /// Factory reset. Cloud-only; always fails with [`Error::Unsupported`].
    pub async fn factory_reset(&self) -> Result<()> {
        Err(Error::Unsupported(UnsupportedFeature::FactoryReset))
    }
}

impl Drop for Desk {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.supervisor.try_lock()
            && let Some(supervisor) = slot.take()
        {
            warn!(
                address = %self.address,
                "Desk dropped without disconnect(); aborting reconnect supervisor. \
                 Call desk.disconnect().await for a clean teardown."
            );
            supervisor.cancel.cancel();
            supervisor.handle.abort();
        }
    }
}
