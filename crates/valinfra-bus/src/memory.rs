//! In-process bus for tests.
//!
//! `MemoryBus` records every published command and routes messages to
//! subscribed inboxes using AMQP topic matching (`*` matches one word, `#`
//! matches zero or more).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{BusError, Result};
use crate::types::{Acknowledge, Command, Delivery};
use crate::{CommandBus, Inbox};

struct Binding {
    routing_keys: Vec<String>,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Inner {
    sent: Vec<Command>,
    bindings: Vec<Binding>,
    closed: bool,
    fail_sends: bool,
}

/// A bus that lives entirely in memory.
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<Inner>,
    acks: Arc<AtomicUsize>,
}

impl MemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command published so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Command> {
        self.inner.lock().sent.clone()
    }

    /// Commands published under `routing_key`.
    #[must_use]
    pub fn sent_to(&self, routing_key: &str) -> Vec<Command> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|c| c.routing_key == routing_key)
            .cloned()
            .collect()
    }

    /// Drain the record of published commands.
    pub fn take_sent(&self) -> Vec<Command> {
        std::mem::take(&mut self.inner.lock().sent)
    }

    /// Make subsequent `send_command` calls fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Number of deliveries acknowledged so far.
    #[must_use]
    pub fn ack_count(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    /// Number of inboxes that are still being consumed.
    #[must_use]
    pub fn inbox_count(&self) -> usize {
        self.inner
            .lock()
            .bindings
            .iter()
            .filter(|b| !b.sender.is_closed())
            .count()
    }

    /// End every open inbox without closing the bus, as a lost broker
    /// connection would. Later subscriptions still succeed.
    pub fn drop_inboxes(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.bindings.len();
        inner.bindings.clear();
        dropped
    }

    /// Publish a JSON event to every inbox bound to `routing_key`.
    ///
    /// Returns the number of inboxes that received it.
    pub fn publish_event(&self, routing_key: &str, body: &Value, reply_to: Option<&str>) -> usize {
        self.route(routing_key, body.to_string().into_bytes(), reply_to.map(str::to_string))
    }

    /// Publish raw bytes to every inbox bound to `routing_key`.
    pub fn publish_raw(&self, routing_key: &str, data: Vec<u8>) -> usize {
        self.route(routing_key, data, None)
    }

    fn route(&self, routing_key: &str, data: Vec<u8>, reply_to: Option<String>) -> usize {
        let inner = self.inner.lock();
        let mut reached = 0;
        for binding in &inner.bindings {
            if !binding
                .routing_keys
                .iter()
                .any(|pattern| topic_matches(pattern, routing_key))
            {
                continue;
            }
            let delivery = Delivery::new(
                routing_key,
                data.clone(),
                reply_to.clone(),
                Some(uuid::Uuid::new_v4().to_string()),
                Box::new(CountingAck(Arc::clone(&self.acks))),
            );
            if binding.sender.send(delivery).is_ok() {
                reached += 1;
            }
        }
        reached
    }
}

#[async_trait]
impl CommandBus for MemoryBus {
    async fn send_command(&self, command: Command) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(BusError::Closed);
            }
            if inner.fail_sends {
                return Err(BusError::Publish {
                    routing_key: command.routing_key,
                    reason: "send failure injected".to_string(),
                });
            }
            inner.sent.push(command.clone());
        }

        self.route(
            &command.routing_key,
            command.payload.to_string().into_bytes(),
            command.reply_to,
        );
        Ok(())
    }

    async fn subscribe(&self, _inbox: &str, routing_keys: &[String]) -> Result<Box<dyn Inbox>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(BusError::Closed);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        inner.bindings.push(Binding {
            routing_keys: routing_keys.to_vec(),
            sender,
        });
        Ok(Box::new(MemoryInbox { receiver }))
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.bindings.clear();
        Ok(())
    }
}

struct MemoryInbox {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

#[async_trait]
impl Inbox for MemoryInbox {
    async fn next_delivery(&mut self) -> Option<Result<Delivery>> {
        self.receiver.recv().await.map(Ok)
    }
}

struct CountingAck(Arc<AtomicUsize>);

#[async_trait]
impl Acknowledge for CountingAck {
    async fn ack(&self) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// AMQP topic matching over dot-separated words.
fn topic_matches(pattern: &str, key: &str) -> bool {
    fn go(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => go(&pattern[1..], key) || (!key.is_empty() && go(pattern, &key[1..])),
            (Some(&"*"), Some(_)) => go(&pattern[1..], &key[1..]),
            (Some(p), Some(k)) if p == k => go(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    go(&pattern, &key)
}
