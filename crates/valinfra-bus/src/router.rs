//! Routing of inbox deliveries to event handlers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::AddAssign;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{Delivery, Event};
use crate::Inbox;

/// Applies one kind of event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// What a successfully applied event reports back.
    type Outcome: fmt::Debug + Send;
    /// Why an event could not be applied.
    type Error: fmt::Display + Send;

    /// Apply an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is malformed or the resulting state change
    /// cannot be persisted.
    async fn handle(&self, event: &Event) -> Result<Self::Outcome, Self::Error>;
}

/// The result of dispatching a single delivery.
#[derive(Debug)]
pub enum Dispatch<O, E> {
    /// The handler applied the event.
    Handled(O),
    /// The handler returned an error.
    Failed(E),
    /// The body was not valid JSON.
    Undecodable(String),
    /// No handler is registered for the routing key.
    Unrouted,
}

/// Counters kept by [`EventRouter::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Deliveries whose handler succeeded.
    pub handled: u64,
    /// Deliveries whose handler failed.
    pub failed: u64,
    /// Deliveries with an undecodable body.
    pub undecodable: u64,
    /// Deliveries with no registered handler.
    pub unrouted: u64,
    /// Deliveries whose acknowledgement failed.
    pub ack_failures: u64,
}

impl AddAssign for RouterStats {
    fn add_assign(&mut self, other: Self) {
        self.handled += other.handled;
        self.failed += other.failed;
        self.undecodable += other.undecodable;
        self.unrouted += other.unrouted;
        self.ack_failures += other.ack_failures;
    }
}

/// Dispatches deliveries to handlers keyed by routing key.
pub struct EventRouter<O, E> {
    handlers: HashMap<String, Arc<dyn EventHandler<Outcome = O, Error = E>>>,
}

impl<O, E> Default for EventRouter<O, E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<O, E> EventRouter<O, E>
where
    O: fmt::Debug + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events arriving on `routing_key`.
    #[must_use]
    pub fn route<H>(mut self, routing_key: impl Into<String>, handler: Arc<H>) -> Self
    where
        H: EventHandler<Outcome = O, Error = E> + 'static,
    {
        self.handlers.insert(routing_key.into(), handler);
        self
    }

    /// The routing keys with a registered handler, sorted.
    #[must_use]
    pub fn routing_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Decode a delivery and hand it to its handler.
    pub async fn dispatch(&self, delivery: &Delivery) -> Dispatch<O, E> {
        let Some(handler) = self.handlers.get(&delivery.routing_key) else {
            return Dispatch::Unrouted;
        };

        let body: Value = match serde_json::from_slice(&delivery.data) {
            Ok(body) => body,
            Err(e) => return Dispatch::Undecodable(e.to_string()),
        };

        let event = Event {
            routing_key: delivery.routing_key.clone(),
            body,
            reply_to: delivery.reply_to.clone(),
            message_id: delivery.message_id.clone(),
        };

        match handler.handle(&event).await {
            Ok(outcome) => Dispatch::Handled(outcome),
            Err(e) => Dispatch::Failed(e),
        }
    }

    /// Dispatch one delivery, log the result and acknowledge it.
    async fn process(&self, delivery: Delivery, stats: &mut RouterStats) {
        let routing_key = delivery.routing_key.as_str();

        match self.dispatch(&delivery).await {
            Dispatch::Handled(outcome) => {
                stats.handled += 1;
                debug!(routing_key, ?outcome, "Handled event");
            }
            Dispatch::Failed(e) => {
                stats.failed += 1;
                warn!(routing_key, error = %e, "Event handler failed");
            }
            Dispatch::Undecodable(reason) => {
                stats.undecodable += 1;
                warn!(routing_key, reason = %reason, "Dropping undecodable event");
            }
            Dispatch::Unrouted => {
                stats.unrouted += 1;
                warn!(routing_key, "Dropping event with no handler");
            }
        }

        if let Err(e) = delivery.ack().await {
            stats.ack_failures += 1;
            warn!(routing_key, error = %e, "Failed to acknowledge event");
        }
    }

    /// Consume `inbox` one delivery at a time until it closes or `shutdown` resolves.
    ///
    /// A delivery that has started processing is always finished and acknowledged
    /// before shutdown takes effect.
    pub async fn run<F>(&self, mut inbox: Box<dyn Inbox>, shutdown: F) -> RouterStats
    where
        F: Future<Output = ()> + Send,
    {
        let mut stats = RouterStats::default();
        tokio::pin!(shutdown);

        info!(routing_keys = ?self.routing_keys(), "Starting event subscriber");

        loop {
            let next = tokio::select! {
                () = &mut shutdown => {
                    info!("Event subscriber shutting down");
                    break;
                }
                next = inbox.next_delivery() => next,
            };

            match next {
                Some(Ok(delivery)) => self.process(delivery, &mut stats).await,
                Some(Err(e)) => warn!(error = %e, "Inbox returned an error"),
                None => {
                    info!("Inbox closed");
                    break;
                }
            }
        }

        stats
    }
}
