//! Notification router: raw notification bytes in, height updates out.
//!
//! Each notification payload delivered by the transport is decoded via the
//! codec, gated on the physical height range, stored as the current reading,
//! and fanned out to the observer registry. Failures never reach observers;
//! they surface as [`DeskEvent`] diagnostics and the previous reading stands.

use std::sync::{Arc, RwLock};

use tracing::debug;

use ergomate_types::{HeightReading, decode_height_notification};

use crate::events::{DeskEvent, EventDispatcher};
use crate::observers::{HeightObserver, ObserverHandle, ObserverRegistry};
use crate::transport::NotificationHandler;

/// Decodes incoming notifications and distributes accepted readings.
pub struct NotificationRouter {
    offset_cm: f32,
    reading: RwLock<Option<HeightReading>>,
    observers: ObserverRegistry,
    events: EventDispatcher,
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("offset_cm", &self.offset_cm)
            .field("reading", &self.current_reading())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl NotificationRouter {
    /// Create a router applying the given calibration offset to readings.
    pub fn new(offset_cm: f32, events: EventDispatcher) -> Self {
        Self {
            offset_cm,
            reading: RwLock::new(None),
            observers: ObserverRegistry::new(),
            events,
        }
    }

    /// The calibration offset readings are stamped with.
    pub fn offset_cm(&self) -> f32 {
        self.offset_cm
    }

    /// The most recently accepted reading, if any.
    pub fn current_reading(&self) -> Option<HeightReading> {
        *self.reading.read().expect("reading lock poisoned")
    }

    /// Register an observer for accepted readings.
    pub fn register(&self, observer: HeightObserver) -> ObserverHandle {
        self.observers.register(observer)
    }

    /// Remove a previously registered observer.
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        self.observers.unregister(handle)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Process one raw notification payload.
    ///
    /// Malformed payloads and implausible heights are dropped with a
    /// diagnostic event; the stored reading is only replaced on acceptance.
    pub fn handle_notification(&self, payload: &[u8]) {
        let raw_mm = match decode_height_notification(payload) {
            Ok(raw_mm) => raw_mm,
            Err(err) => {
                debug!("Dropping notification: {}", err);
                self.events.send(DeskEvent::MalformedNotification {
                    payload: payload.to_vec(),
                });
                return;
            }
        };

        let reading = HeightReading::with_offset(raw_mm, self.offset_cm);
        if !reading.is_plausible() {
            // Well-formed digits can still be a torn or corrupted frame.
            debug!("Dropping implausible height reading: {} mm", raw_mm);
            self.events.send(DeskEvent::ImplausibleReading { raw_mm });
            return;
        }

        debug!("Height: {:.1} cm", reading.calibrated_cm());
        *self.reading.write().expect("reading lock poisoned") = Some(reading);
        self.events.send(DeskEvent::Height { reading });
        self.observers.notify(reading);
    }

    /// Build the transport-facing handler for this router.
    pub fn handler(self: &Arc<Self>) -> NotificationHandler {
        let router = Arc::clone(self);
        Arc::new(move |payload: &[u8]| router.handle_notification(payload))
    }
}
