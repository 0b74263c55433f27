//! Messages and configuration for the bus.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A command addressed to an external driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Topic the command is published under.
    pub routing_key: String,
    /// JSON body.
    pub payload: Value,
    /// Topic the driver should publish its result event to.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Command {
    /// Build a command that expects a reply on `reply_to`.
    #[must_use]
    pub fn new(routing_key: impl Into<String>, payload: Value, reply_to: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            reply_to: Some(reply_to.into()),
        }
    }

    /// Build a fire-and-forget notification with no reply topic.
    #[must_use]
    pub fn notification(routing_key: impl Into<String>, payload: Value) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            reply_to: None,
        }
    }
}

/// A decoded event, as handed to an [`EventHandler`](crate::EventHandler).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Topic the event arrived on.
    pub routing_key: String,
    /// Decoded JSON body.
    pub body: Value,
    /// Topic the sender asked results to be forwarded to, if any.
    pub reply_to: Option<String>,
    /// Broker message ID, if any.
    pub message_id: Option<String>,
}

/// Acknowledges one delivery back to the broker.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the acknowledgement.
    async fn ack(&self) -> Result<()>;
}

/// A raw message taken from an inbox, not yet decoded.
pub struct Delivery {
    /// Topic the message arrived on.
    pub routing_key: String,
    /// Raw body bytes.
    pub data: Vec<u8>,
    /// Reply topic property.
    pub reply_to: Option<String>,
    /// Message ID property.
    pub message_id: Option<String>,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Wrap a raw message with the handle that acknowledges it.
    #[must_use]
    pub fn new(
        routing_key: impl Into<String>,
        data: Vec<u8>,
        reply_to: Option<String>,
        message_id: Option<String>,
        acker: Box<dyn Acknowledge>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            data,
            reply_to,
            message_id,
            acker,
        }
    }

    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the acknowledgement.
    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("len", &self.data.len())
            .field("reply_to", &self.reply_to)
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Broker user name.
    pub username: String,
    /// Broker password.
    pub password: String,
    /// Broker host.
    pub host: String,
    /// Broker AMQP port.
    pub port: u16,
    /// Topic exchange every command and event goes through.
    pub exchange: String,
    /// Maximum number of unacknowledged deliveries per consumer.
    pub prefetch: u16,
    /// Connection attempts before giving up at startup.
    pub connect_attempts: u32,
    /// Delay before the first reconnection attempt; doubles after each failure.
    pub connect_backoff: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            username: "guest".to_string(),
            password: "guest".to_string(),
            host: "localhost".to_string(),
            port: 5672,
            exchange: "vchain.zone".to_string(),
            prefetch: 10,
            connect_attempts: 5,
            connect_backoff: Duration::from_millis(500),
        }
    }
}

impl BusConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `RABBITMQ_USERNAME`, `RABBITMQ_PASSWORD`: credentials
    /// - `RABBITMQ_HOST`, `RABBITMQ_PORT`: broker address
    /// - `RABBITMQ_EXCHANGE_NAME`: topic exchange name
    /// - `RABBITMQ_PREFETCH`: consumer prefetch count
    /// - `RABBITMQ_CONNECT_ATTEMPTS`: startup connection attempts
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RABBITMQ_USERNAME") {
            config.username = val;
        }
        if let Ok(val) = std::env::var("RABBITMQ_PASSWORD") {
            config.password = val;
        }
        if let Ok(val) = std::env::var("RABBITMQ_HOST") {
            config.host = val;
        }
        if let Ok(val) = std::env::var("RABBITMQ_PORT") {
            if let Ok(n) = val.parse() {
                config.port = n;
            }
        }
        if let Ok(val) = std::env::var("RABBITMQ_EXCHANGE_NAME") {
            config.exchange = val;
        }
        if let Ok(val) = std::env::var("RABBITMQ_PREFETCH") {
            if let Ok(n) = val.parse() {
                config.prefetch = n;
            }
        }
        if let Ok(val) = std::env::var("RABBITMQ_CONNECT_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.connect_attempts = n;
            }
        }

        config
    }

    /// The AMQP URI for this configuration, using the default virtual host.
    #[must_use]
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.username, self.password, self.host, self.port
        )
    }
}
