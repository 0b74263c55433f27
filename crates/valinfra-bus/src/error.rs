//! Error types for the message bus.

use thiserror::Error;

/// A result type using `BusError`.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached or the connection dropped.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// A command could not be published.
    #[error("failed to publish to {routing_key}: {reason}")]
    Publish {
        /// Routing key of the command.
        routing_key: String,
        /// Broker-side reason.
        reason: String,
    },

    /// The inbox could not be declared, bound or consumed.
    #[error("failed to subscribe inbox {inbox}: {reason}")]
    Subscribe {
        /// Name of the inbox queue.
        inbox: String,
        /// Broker-side reason.
        reason: String,
    },

    /// A delivery could not be acknowledged.
    #[error("failed to acknowledge delivery: {0}")]
    Acknowledge(String),

    /// A payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The bus has been closed.
    #[error("bus is closed")]
    Closed,
}

impl BusError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Publish { .. })
    }
}
