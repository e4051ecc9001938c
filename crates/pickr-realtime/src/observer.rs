//! Typed observer registry for change notifications.
//!
//! Consumers register an observer when their view mounts and unregister it
//! when it unmounts. Every [`SyncEvent`] produced by the engine is delivered
//! to all registered observers, in the engine loop, after the mutation that
//! caused it has been applied.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pickr_core::events::SyncEvent;

/// Receives change notifications from the sync engine.
///
/// Implementations must not block: they run on the engine loop.
pub trait SyncObserver: Send + Sync {
    /// Called once per notification.
    fn on_event(&self, event: &SyncEvent);
}

impl<F> SyncObserver for F
where
    F: Fn(&SyncEvent) + Send + Sync,
{
    fn on_event(&self, event: &SyncEvent) {
        self(event)
    }
}

/// Registration handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry of live observers.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: DashMap<ObserverId, Arc<dyn SyncObserver>>,
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer.
    pub fn register(&self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        self.observers.insert(id, observer);
        tracing::debug!(observer_id = %id, "Observer registered");
        id
    }

    /// Unregisters an observer. Returns whether it was registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            tracing::debug!(observer_id = %id, "Observer unregistered");
        }
        removed
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers one event to every observer.
    pub fn notify(&self, event: &SyncEvent) {
        // Collect first so an observer may unregister itself from the callback.
        let targets: Vec<Arc<dyn SyncObserver>> = self
            .observers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        tracing::trace!(event = event.name(), observers = targets.len(), "Dispatching");
        for observer in targets {
            observer.on_event(event);
        }
    }
}
