//! Supervision of the driver event subscriber.
//!
//! The subscriber owns the readiness flag: it is set while an inbox is being
//! consumed and cleared as soon as consumption stops. An inbox that ends
//! before shutdown is resubscribed with exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};
use valinfra_bus::{CommandBus, EventRouter, RouterStats};
use valinfra_store::Store;

use crate::state::ServiceState;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Consumes driver events and keeps the subscription alive.
pub struct EventSubscriber<S: Store, B, O, E> {
    bus: Arc<B>,
    router: EventRouter<O, E>,
    inbox: String,
    state: ServiceState<S>,
    retry_delay: Duration,
}

impl<S, B, O, E> EventSubscriber<S, B, O, E>
where
    S: Store + 'static,
    B: CommandBus + 'static,
    O: fmt::Debug + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Create a subscriber for `inbox`.
    #[must_use]
    pub fn new(bus: Arc<B>, router: EventRouter<O, E>, inbox: impl Into<String>, state: ServiceState<S>) -> Self {
        Self {
            bus,
            router,
            inbox: inbox.into(),
            state,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set the delay before the first resubscription attempt.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Consume events until `true` is sent on `shutdown` or its sender is dropped.
    ///
    /// Returns the counters summed over every subscription.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> RouterStats {
        let routing_keys = self.router.routing_keys();
        let mut stats = RouterStats::default();
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.bus.subscribe(&self.inbox, &routing_keys).await {
                Ok(inbox) => {
                    failures = 0;
                    self.state.set_subscriber_running(true);
                    stats += self.router.run(inbox, wait_for_shutdown(shutdown.clone())).await;
                    self.state.set_subscriber_running(false);

                    if *shutdown.borrow() {
                        break;
                    }
                    error!(inbox = %self.inbox, "Event subscriber stopped unexpectedly, resubscribing");
                    self.retry_delay
                }
                Err(e) => {
                    let delay = backoff(self.retry_delay, failures);
                    failures = failures.saturating_add(1);
                    error!(
                        inbox = %self.inbox,
                        attempt = failures,
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Failed to subscribe to event inbox"
                    );
                    delay
                }
            };

            tokio::select! {
                () = wait_for_shutdown(shutdown.clone()) => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state.set_subscriber_running(false);
        info!(
            handled = stats.handled,
            failed = stats.failed,
            undecodable = stats.undecodable,
            unrouted = stats.unrouted,
            "Event subscriber stopped"
        );
        stats
    }
}

/// Resolve once `true` is sent on the shutdown channel or the sender is dropped.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn backoff(base: Duration, failures: u32) -> Duration {
    base.saturating_mul(1 << failures.min(5)).min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use valinfra_bus::MemoryBus;
    use valinfra_control::{event_router, ControlError, ControlPlaneService, EventOutcome};
    use valinfra_store::RocksStore;

    type Subscriber = EventSubscriber<RocksStore, MemoryBus, EventOutcome, ControlError>;

    struct Fixture {
        _dir: tempfile::TempDir,
        bus: Arc<MemoryBus>,
        state: ServiceState<RocksStore>,
        subscriber: Subscriber,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let bus = Arc::new(MemoryBus::new());
        let control = Arc::new(ControlPlaneService::with_defaults(Arc::clone(&store), Arc::clone(&bus)));
        let state = ServiceState::new(store);
        let subscriber = EventSubscriber::new(Arc::clone(&bus), event_router(&control), "events", state.clone())
            .with_retry_delay(Duration::from_millis(10));
        Fixture {
            _dir: dir,
            bus,
            state,
            subscriber,
        }
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff(base, 0), base);
        assert_eq!(backoff(base, 2), Duration::from_secs(4));
        assert_eq!(backoff(base, 40), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn resubscribes_after_the_inbox_ends() {
        let Fixture {
            _dir,
            bus,
            state,
            subscriber,
        } = fixture();
        let topic = subscriber.router.routing_keys().remove(0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { subscriber.run(shutdown_rx).await });

        eventually("first subscription", || bus.inbox_count() == 1 && state.subscriber_running()).await;
        bus.publish_raw(&topic, b"not json".to_vec());
        eventually("first delivery acked", || bus.ack_count() == 1).await;

        bus.drop_inboxes();
        eventually("resubscription", || bus.inbox_count() == 1 && state.subscriber_running()).await;
        bus.publish_raw(&topic, b"still not json".to_vec());
        eventually("second delivery acked", || bus.ack_count() == 2).await;

        shutdown_tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.undecodable, 2);
        assert!(!state.subscriber_running());
    }

    #[tokio::test]
    async fn not_running_while_the_bus_refuses_subscriptions() {
        let Fixture {
            _dir,
            bus,
            state,
            subscriber,
        } = fixture();
        bus.close().await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { subscriber.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!state.subscriber_running());

        shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), RouterStats::default());
    }
}
