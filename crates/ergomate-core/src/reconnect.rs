//! Automatic reconnection handling for desk sessions.
//!
//! One supervisor task runs per [`Desk`](crate::desk::Desk). It sleeps until
//! the transport reports unexpected link loss, then retries `open` with a
//! bounded exponential backoff while the session is in active use, and
//! resubscribes notifications once the link is back. Cancellation is checked
//! at every backoff boundary; `disconnect()` cancels the token and awaits the
//! task, so no attempt is issued after cancellation is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ergomate_types::ConnectionStatus;
use ergomate_types::uuid::NOTIFY_CHARACTERISTIC;

use crate::error::{Error, Result};
use crate::events::{DeskEvent, DisconnectReason, EventDispatcher};
use crate::router::NotificationRouter;
use crate::transport::{DeskTransport, LinkDropReceiver};

/// Options for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectOptions {
    /// Maximum number of attempts per outage (None = unlimited).
    pub max_attempts: Option<u32>,
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectOptions {
    /// Create new reconnect options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of attempts per outage.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the initial delay before the first reconnection attempt.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between attempts.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate the delay preceding a given 0-based attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `backoff_multiplier` < 1.0,
    /// `initial_delay` is zero, or `max_delay` < `initial_delay`.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidConfig(
                "initial_delay must be > 0".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::InvalidConfig(
                "max_delay must be >= initial_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared session state the supervisor operates on.
///
/// Everything here is a clone of an `Arc` owned by the `Desk`; the supervisor
/// task holds no reference back to the `Desk` itself.
pub(crate) struct SupervisorContext {
    pub address: String,
    pub transport: Arc<dyn DeskTransport>,
    pub status: Arc<RwLock<ConnectionStatus>>,
    pub router: Arc<NotificationRouter>,
    pub subscribed: Arc<AtomicBool>,
    pub moving: Arc<AtomicBool>,
    pub events: EventDispatcher,
    pub options: ReconnectOptions,
    pub connect_timeout: Duration,
}

impl SupervisorContext {
    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().expect("status lock poisoned") = status;
    }

    /// Whether the session warrants autonomous reconnection.
    fn in_active_use(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
            || self.moving.load(Ordering::SeqCst)
            || self.router.observer_count() > 0
    }
}

/// Supervisor task body. Spawned once per successful `connect()`.
///
/// `drops` must be subscribed before the spawn so a link loss racing the
/// spawn is not missed.
pub(crate) async fn run_supervisor(
    ctx: SupervisorContext,
    cancel: CancellationToken,
    mut drops: LinkDropReceiver,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Reconnect supervisor for {} cancelled", ctx.address);
                return;
            }
            drop = drops.recv() => match drop {
                Ok(()) => {}
                // A missed drop still means the link went down at least once.
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    debug!("Link-drop channel closed for {}", ctx.address);
                    return;
                }
            }
        }

        info!("Link lost to desk at {}", ctx.address);
        ctx.set_status(ConnectionStatus::Disconnected);
        ctx.moving.store(false, Ordering::SeqCst);
        ctx.events.send(DeskEvent::Disconnected {
            address: ctx.address.clone(),
            reason: DisconnectReason::LinkLost,
        });

        if !ctx.in_active_use() {
            debug!(
                "Desk at {} is idle (no observers, no commands); not reconnecting",
                ctx.address
            );
            continue;
        }

        if !reconnect_with_backoff(&ctx, &cancel).await {
            return;
        }
    }
}

/// Restore the notification subscription after the link came back.
///
/// Prior observers expect notifications to resume on their own.
async fn resubscribe_if_needed(ctx: &SupervisorContext) {
    if ctx.subscribed.load(Ordering::SeqCst) {
        let handler = ctx.router.handler();
        if let Err(e) = ctx.transport.subscribe(NOTIFY_CHARACTERISTIC, handler).await {
            warn!("Failed to resubscribe notifications after reconnect: {}", e);
        }
    }
}

/// Retry `open` until success, cancellation, or the attempt bound.
///
/// Returns `false` when the supervisor should exit (cancelled).
async fn reconnect_with_backoff(ctx: &SupervisorContext, cancel: &CancellationToken) -> bool {
    let mut attempt: u32 = 0;

    loop {
        if let Some(max) = ctx.options.max_attempts
            && attempt >= max
        {
            warn!(
                "Giving up on desk at {} after {} reconnect attempts",
                ctx.address, attempt
            );
            return true;
        }

        let delay = ctx.options.delay_for_attempt(attempt);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(delay) => {}
        }

        // A caller's explicit connect() may have restored the link while we
        // slept; opening again would flap the status for nothing.
        if ctx.transport.is_open().await {
            debug!(
                "Link to desk at {} already restored; supervisor standing down",
                ctx.address
            );
            ctx.set_status(ConnectionStatus::Connected);
            resubscribe_if_needed(ctx).await;
            return true;
        }

        attempt += 1;
        ctx.events.send(DeskEvent::ReconnectStarted {
            address: ctx.address.clone(),
            attempt,
        });
        info!("Reconnection attempt {} for desk at {}", attempt, ctx.address);

        ctx.set_status(ConnectionStatus::Connecting);
        match timeout(ctx.connect_timeout, ctx.transport.open()).await {
            Ok(Ok(())) => {
                ctx.set_status(ConnectionStatus::Connected);
                resubscribe_if_needed(ctx).await;
                ctx.events.send(DeskEvent::ReconnectSucceeded {
                    address: ctx.address.clone(),
                    attempts: attempt,
                });
                ctx.events.send(DeskEvent::Connected {
                    address: ctx.address.clone(),
                });
                info!(
                    "Reconnected to desk at {} after {} attempts",
                    ctx.address, attempt
                );
                return true;
            }
            Ok(Err(e)) => {
                ctx.set_status(ConnectionStatus::Disconnected);
                warn!("Reconnection attempt {} failed: {}", attempt, e);
            }
            Err(_) => {
                ctx.set_status(ConnectionStatus::Disconnected);
                warn!(
                    "Reconnection attempt {} timed out after {:?}",
                    attempt, ctx.connect_timeout
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_options_default() {
        let opts = ReconnectOptions::default();
        assert!(opts.max_attempts.is_none());
        assert_eq!(opts.initial_delay, Duration::from_secs(1));
        assert_eq!(opts.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let opts = ReconnectOptions::default();
        assert_eq!(opts.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(opts.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(opts.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(opts.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let opts = ReconnectOptions::default();
        // 2^10 seconds, capped at 30
        assert_eq!(opts.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        assert!(
            ReconnectOptions::default()
                .backoff_multiplier(0.5)
                .validate()
                .is_err()
        );
        assert!(
            ReconnectOptions::default()
                .initial_delay(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ReconnectOptions::default()
                .max_delay(Duration::from_millis(10))
                .validate()
                .is_err()
        );
        assert!(ReconnectOptions::default().validate().is_ok());
    }
}
