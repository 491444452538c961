//! Observer registry for height updates.
//!
//! Registration and removal are safe while a fan-out is in progress; callbacks
//! are invoked outside the registry lock so an observer may register or remove
//! observers from within its own callback without deadlocking. An observer
//! present for the whole duration of a fan-out is invoked exactly once per
//! reading; one added or removed mid-fan-out may or may not see that reading.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ergomate_types::HeightReading;

/// Callback receiving each accepted height reading. Fire-and-forget.
pub type HeightObserver = Arc<dyn Fn(HeightReading) + Send + Sync>;

/// Handle identifying a registered observer, returned by
/// [`ObserverRegistry::register`] and used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// Thread-safe registry of height observers.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<HashMap<u64, HeightObserver>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, returning a handle for removal.
    pub fn register(&self, observer: HeightObserver) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .expect("observer registry lock poisoned")
            .insert(id, observer);
        ObserverHandle(id)
    }

    /// Remove an observer. Returns `true` if the handle was registered.
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        self.observers
            .lock()
            .expect("observer registry lock poisoned")
            .remove(&handle.0)
            .is_some()
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers
            .lock()
            .expect("observer registry lock poisoned")
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one reading to every registered observer.
    ///
    /// The callback list is snapshotted under the lock and invoked outside it.
    pub fn notify(&self, reading: HeightReading) {
        let snapshot: Vec<HeightObserver> = {
            let observers = self
                .observers
                .lock()
                .expect("observer registry lock poisoned");
            observers.values().cloned().collect()
        };
        for observer in snapshot {
            observer(reading);
        }
    }
}
