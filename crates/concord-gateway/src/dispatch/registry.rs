//! Listener registration

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use concord_core::{EventHandler, EventKind};

/// Holds the registered event handlers
#[derive(Default)]
pub struct ListenerRegistry {
    by_kind: DashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
    any: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn add(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.by_kind.entry(kind).or_default().push(handler);
    }

    /// Register a handler that sees every event
    pub fn add_any(&self, handler: Arc<dyn EventHandler>) {
        self.any.write().push(handler);
    }

    /// Snapshot of the handlers interested in one event kind, kind-bound
    /// handlers first
    #[must_use]
    pub fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        let mut handlers = Vec::new();
        if let Some(list) = self.by_kind.get(&kind) {
            handlers.extend(list.iter().cloned());
        }
        handlers.extend(self.any.read().iter().cloned());
        handlers
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty() && self.any.read().is_empty()
    }
}
