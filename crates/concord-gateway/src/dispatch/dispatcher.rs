//! Ordered, parallel event delivery
//!
//! Events are grouped by their dispatch context. Within one context they
//! reach listeners strictly in arrival order; different contexts deliver
//! in parallel, bounded by a worker pool. A panicking listener is caught
//! and logged so it cannot stall its context's queue.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use concord_core::{DispatchContext, EventHandler, EventKind, EventRecord};

use crate::dispatch::ListenerRegistry;

struct ContextQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<EventRecord>,
    draining: bool,
}

struct DispatchInner {
    registry: ListenerRegistry,
    queues: DashMap<DispatchContext, Arc<ContextQueue>>,
    workers: Arc<Semaphore>,
}

/// Fans events out to listeners with per-context ordering
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatchInner>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                registry: ListenerRegistry::new(),
                queues: DashMap::new(),
                workers: Arc::new(Semaphore::new(worker_count.max(1))),
            }),
        }
    }

    /// Register a handler for one event kind
    pub fn on(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.inner.registry.add(kind, handler);
    }

    /// Register a handler that sees every event
    pub fn on_any(&self, handler: Arc<dyn EventHandler>) {
        self.inner.registry.add_any(handler);
    }

    /// Queue an event for delivery in its context's order
    pub fn enqueue(&self, event: EventRecord) {
        let context = event.context;
        let queue = self
            .inner
            .queues
            .entry(context)
            .or_insert_with(|| {
                Arc::new(ContextQueue {
                    state: Mutex::new(QueueState::default()),
                })
            })
            .clone();

        let spawn_drainer = {
            let mut state = queue.state.lock();
            state.queue.push_back(event);
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };
        if spawn_drainer {
            tokio::spawn(drain_context(Arc::clone(&self.inner), context, queue));
        }
    }
}

/// Deliver one context's events in order until its queue runs dry
async fn drain_context(
    inner: Arc<DispatchInner>,
    context: DispatchContext,
    queue: Arc<ContextQueue>,
) {
    loop {
        let event = {
            let mut state = queue.state.lock();
            match state.queue.pop_front() {
                Some(event) => event,
                None => {
                    state.draining = false;
                    return;
                }
            }
        };

        let handlers = inner.registry.handlers_for(event.kind);
        if handlers.is_empty() {
            debug!(kind = %event.kind, %context, "no listeners for event");
            continue;
        }

        // The permit bounds how many contexts deliver at the same time.
        let Ok(permit) = Arc::clone(&inner.workers).acquire_owned().await else {
            return;
        };
        for handler in handlers {
            let delivery = AssertUnwindSafe(handler.on_event(&event)).catch_unwind();
            if delivery.await.is_err() {
                error!(kind = %event.kind, %context, "listener panicked on event");
            }
        }
        drop(permit);
    }
}
