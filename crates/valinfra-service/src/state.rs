//! Shared state for the health endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use valinfra_store::Store;

/// State available to every request handler.
pub struct ServiceState<S: Store> {
    /// Document store, read by the readiness check.
    pub store: Arc<S>,
    subscriber_running: Arc<AtomicBool>,
}

impl<S: Store> ServiceState<S> {
    /// Create a new state with the subscriber not yet running.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            subscriber_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record whether the event subscriber is consuming.
    pub fn set_subscriber_running(&self, running: bool) {
        self.subscriber_running.store(running, Ordering::SeqCst);
    }

    /// Whether the event subscriber is consuming.
    #[must_use]
    pub fn subscriber_running(&self) -> bool {
        self.subscriber_running.load(Ordering::SeqCst)
    }
}

impl<S: Store> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            subscriber_running: Arc::clone(&self.subscriber_running),
        }
    }
}
