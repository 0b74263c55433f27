//! Error types for the service crate.

use std::path::PathBuf;

use thiserror::Error;

/// A result type using `ServiceError`.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised while starting the service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for its type.
    #[error("Invalid network configuration in {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying decode error.
        source: serde_json::Error,
    },

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] valinfra_store::StoreError),

    /// Bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] valinfra_bus::BusError),
}
