//! Event handler trait (port) - the interface listener code implements
//!
//! The dispatcher invokes handlers with decoded records; all JSON decoding
//! into domain entities happens behind this trait, outside the core.

use async_trait::async_trait;

use crate::events::EventRecord;

/// A registered event listener
///
/// Handlers for the same dispatch context are invoked sequentially in
/// enqueue order. A panicking handler is isolated per invocation and does
/// not stop delivery of later events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Deliver one decoded event to the listener
    async fn on_event(&self, event: &EventRecord);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn on_event(&self, _event: &EventRecord) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_handler_invocation() {
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler { seen: seen.clone() };

        let record = EventRecord::new(
            0,
            EventKind::MessageCreate,
            1,
            serde_json::json!({ "id": "1" }),
        );
        handler.on_event(&record).await;
        handler.on_event(&record).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
