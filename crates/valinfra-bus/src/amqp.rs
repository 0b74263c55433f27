//! `RabbitMQ` transport.
//!
//! Commands and events share one durable topic exchange. Each service owns one
//! durable inbox queue, bound to the reply topics it listens on, so events
//! published while the service is down are delivered after it comes back.
//!
//! A lost connection is re-established on the next send or subscribe, with
//! the same backoff as the initial connect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::error::{BusError, Result};
use crate::types::{Acknowledge, BusConfig, Command, Delivery};
use crate::{CommandBus, Inbox};

/// Delivery mode marking a message as persistent.
const PERSISTENT: u8 = 2;

/// Upper bound on the delay between connection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A broker connection and the channel commands are published on.
struct Link {
    connection: Connection,
    publisher: Channel,
}

impl Link {
    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.publisher.status().connected()
    }
}

/// A `CommandBus` backed by an AMQP 0.9.1 broker.
pub struct AmqpBus {
    link: RwLock<Link>,
    closed: AtomicBool,
    config: BusConfig,
}

impl AmqpBus {
    /// Connect to the broker and declare the exchange.
    ///
    /// Failed attempts are retried with exponential backoff, up to
    /// `config.connect_attempts` in total.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Connection` if every attempt fails.
    pub async fn connect(config: BusConfig) -> Result<Self> {
        let link = Self::establish(&config).await?;
        Ok(Self {
            link: RwLock::new(link),
            closed: AtomicBool::new(false),
            config,
        })
    }

    async fn establish(config: &BusConfig) -> Result<Link> {
        let attempts = config.connect_attempts.max(1);
        let mut backoff = config.connect_backoff;
        let mut attempt = 1;

        loop {
            match Self::open_link(config).await {
                Ok(link) => {
                    info!(
                        host = %config.host,
                        port = config.port,
                        exchange = %config.exchange,
                        "Connected to message broker"
                    );
                    return Ok(link);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        retry_in_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Broker connection failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open_link(config: &BusConfig) -> Result<Link> {
        let connection = Connection::connect(&config.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let publisher = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        publisher
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        Ok(Link {
            connection,
            publisher,
        })
    }

    /// The live link, reconnecting first if the broker dropped it.
    async fn link(&self) -> Result<RwLockReadGuard<'_, Link>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let link = self.link.read().await;
        if link.is_connected() {
            return Ok(link);
        }
        drop(link);

        let mut link = self.link.write().await;
        if !link.is_connected() {
            warn!(host = %self.config.host, "Broker connection lost, reconnecting");
            *link = Self::establish(&self.config).await?;
        }
        Ok(link.downgrade())
    }

    /// The configuration this bus was connected with.
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }
}

#[async_trait]
impl CommandBus for AmqpBus {
    async fn send_command(&self, command: Command) -> Result<()> {
        let body = serde_json::to_vec(&command.payload)?;
        let message_id = uuid::Uuid::new_v4().to_string();

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT)
            .with_message_id(message_id.as_str().into());
        if let Some(reply_to) = &command.reply_to {
            properties = properties.with_reply_to(reply_to.as_str().into());
        }

        let publish_error = |e: lapin::Error| BusError::Publish {
            routing_key: command.routing_key.clone(),
            reason: e.to_string(),
        };

        let link = self.link().await?;
        link.publisher
            .basic_publish(
                &self.config.exchange,
                &command.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        debug!(
            routing_key = %command.routing_key,
            reply_to = ?command.reply_to,
            message_id = %message_id,
            "Published command"
        );
        Ok(())
    }

    async fn subscribe(&self, inbox: &str, routing_keys: &[String]) -> Result<Box<dyn Inbox>> {
        let subscribe_error = |e: lapin::Error| BusError::Subscribe {
            inbox: inbox.to_string(),
            reason: e.to_string(),
        };

        let link = self.link().await?;
        let channel = link
            .connection
            .create_channel()
            .await
            .map_err(subscribe_error)?;

        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await
            .map_err(subscribe_error)?;

        channel
            .queue_declare(
                inbox,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_error)?;

        for routing_key in routing_keys {
            channel
                .queue_bind(
                    inbox,
                    &self.config.exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(subscribe_error)?;
        }

        let consumer = channel
            .basic_consume(
                inbox,
                &format!("{inbox}.{}", uuid::Uuid::new_v4()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_error)?;

        info!(
            inbox,
            routing_keys = ?routing_keys,
            prefetch = self.config.prefetch,
            "Subscribed inbox"
        );

        Ok(Box::new(AmqpInbox {
            consumer,
            failed: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let link = self.link.read().await;
        link.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        info!("Closed message broker connection");
        Ok(())
    }
}

struct AmqpInbox {
    consumer: Consumer,
    failed: bool,
}

#[async_trait]
impl Inbox for AmqpInbox {
    /// Ends after the first consumer error; the channel is unusable by then.
    async fn next_delivery(&mut self) -> Option<Result<Delivery>> {
        if self.failed {
            return None;
        }
        let next = self.consumer.next().await?;
        self.failed = next.is_err();
        Some(
            next.map(|delivery| {
                let reply_to = delivery
                    .properties
                    .reply_to()
                    .as_ref()
                    .map(ToString::to_string);
                let message_id = delivery
                    .properties
                    .message_id()
                    .as_ref()
                    .map(ToString::to_string);
                Delivery::new(
                    delivery.routing_key.as_str(),
                    delivery.data,
                    reply_to,
                    message_id,
                    Box::new(AmqpAck(delivery.acker)),
                )
            })
            .map_err(|e| BusError::Connection(e.to_string())),
        )
    }
}

struct AmqpAck(lapin::acker::Acker);

#[async_trait]
impl Acknowledge for AmqpAck {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BusError::Acknowledge(e.to_string()))
    }
}
