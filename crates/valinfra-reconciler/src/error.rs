//! Error types for the reconciler crate.

use thiserror::Error;

/// A result type using `ReconcileError`.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can occur during a reconciliation pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] valinfra_store::StoreError),

    /// The update command could not be published.
    #[error("Bus error: {0}")]
    Bus(#[from] valinfra_bus::BusError),

    /// No setup configuration exists for the snapshot's network.
    #[error("Network not found: {0}")]
    NetworkNotFound(String),
}

impl ReconcileError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Bus(e) => e.is_retriable(),
            Self::NetworkNotFound(_) => false,
        }
    }
}
