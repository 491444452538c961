//! Desk event channel for connection transitions and diagnostics.
//!
//! Background activity (the reconnect supervisor, the notification router)
//! never raises errors at callers; this broadcast channel is how that activity
//! stays observable. All events are serializable for logging and IPC.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ergomate_types::HeightReading;

/// Events emitted by a desk session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeskEvent {
    /// The transport link was opened.
    Connected {
        /// Desk address.
        address: String,
    },
    /// The transport link was closed or lost.
    Disconnected {
        /// Desk address.
        address: String,
        /// Why the link went down.
        reason: DisconnectReason,
    },
    /// A reconnect attempt is starting.
    ReconnectStarted {
        /// Desk address.
        address: String,
        /// 1-based attempt counter since the link was lost.
        attempt: u32,
    },
    /// Reconnection succeeded.
    ReconnectSucceeded {
        /// Desk address.
        address: String,
        /// Attempts it took to get the link back.
        attempts: u32,
    },
    /// A height notification was accepted and the current reading updated.
    Height {
        /// The accepted reading.
        reading: HeightReading,
    },
    /// A notification payload failed to decode and was dropped.
    MalformedNotification {
        /// The raw payload.
        payload: Vec<u8>,
    },
    /// A notification decoded cleanly but lies outside the physical height
    /// range; the previous reading was retained.
    ImplausibleReading {
        /// The decoded millimeter value.
        raw_mm: u16,
    },
}

/// Reason for a disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Normal disconnection requested by the caller.
    UserRequested,
    /// The transport reported unexpected link loss.
    LinkLost,
}

/// Sender for desk events.
pub type EventSender = broadcast::Sender<DeskEvent>;

/// Receiver for desk events.
pub type EventReceiver = broadcast::Receiver<DeskEvent>;

/// Event dispatcher fanning events out to any number of receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event. Silently dropped when no receivers exist.
    pub fn send(&self, event: DeskEvent) {
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();

        dispatcher.send(DeskEvent::Connected {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        });

        match rx.recv().await.unwrap() {
            DeskEvent::Connected { address } => assert_eq!(address, "AA:BB:CC:DD:EE:FF"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_send_without_receivers_is_harmless() {
        let dispatcher = EventDispatcher::new(8);
        dispatcher.send(DeskEvent::ImplausibleReading { raw_mm: 9999 });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_events_are_serializable() {
        fn assert_serialize<T: Serialize>(_: &T) {}
        assert_serialize(&DeskEvent::Height {
            reading: HeightReading::with_offset(720, 2.0),
        });
    }
}
