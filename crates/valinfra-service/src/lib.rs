//! Valinfra service: process wiring for the lifecycle core.
//!
//! The `valinfra` binary opens the document store, seeds network setup
//! configurations, subscribes the driver event handlers to the command bus,
//! runs the cron reconciler and serves liveness and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness
//! - `GET /ready` - Readiness: event subscriber consuming and store readable

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod seed;
pub mod state;
pub mod subscriber;

pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use routes::create_router;
pub use seed::{load_network_configs, seed_network_configs};
pub use state::ServiceState;
pub use subscriber::{wait_for_shutdown, EventSubscriber};
