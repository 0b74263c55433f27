//! Command/event message bus for valinfra.
//!
//! The lifecycle core talks to external drivers asynchronously: it publishes a
//! [`Command`] under a routing key with a reply topic, and later receives the
//! driver's result as an event on that topic. This crate provides:
//!
//! - [`CommandBus`] and [`Inbox`]: the transport seam
//! - [`EventRouter`]: dispatches inbox deliveries to [`EventHandler`]s by routing key
//! - [`AmqpBus`]: the `RabbitMQ` transport (durable topic exchange, durable inbox)
//! - `MemoryBus` (feature `test-utils`): an in-process bus for tests
//!
//! Delivery is at-least-once. Handlers must tolerate duplicates and reordering;
//! the router acknowledges every delivery after its handler returns, whether the
//! handler succeeded or not.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod amqp;
pub mod error;
pub mod router;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use amqp::AmqpBus;
pub use error::{BusError, Result};
pub use router::{Dispatch, EventHandler, EventRouter, RouterStats};
pub use types::{Acknowledge, BusConfig, Command, Delivery, Event};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryBus;

use async_trait::async_trait;

/// Publishes commands and opens inboxes.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Publish a command.
    ///
    /// Returns once the broker has accepted the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded or the broker rejects it.
    async fn send_command(&self, command: Command) -> Result<()>;

    /// Declare a durable inbox bound to `routing_keys` and start consuming from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the inbox cannot be declared, bound or consumed.
    async fn subscribe(&self, inbox: &str, routing_keys: &[String]) -> Result<Box<dyn Inbox>>;

    /// Close the connection. Open inboxes end after their in-flight delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker connection cannot be closed cleanly.
    async fn close(&self) -> Result<()>;
}

/// A stream of deliveries from a subscribed inbox.
#[async_trait]
pub trait Inbox: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `None` once the inbox is closed.
    async fn next_delivery(&mut self) -> Option<Result<Delivery>>;
}
