//! Lifecycle core for validator infrastructure.
//!
//! This crate owns the state machines of snapshots, nodes and projects. It
//! validates user requests, persists the resulting pending state, sends the
//! matching command to an external driver and later applies the driver's
//! result event.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Callers (API layer, Reconciler)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Snapshot   │ │    Node     │ │     Lifecycle       │    │
//! │  │  Requests   │ │  Requests   │ │   State Machines    │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!               │              │              ▲
//!               ▼              ▼              │ result events
//!        ┌──────────┐   ┌──────────┐   ┌──────────────┐
//!        │  Store   │   │CommandBus│──▶│   Drivers    │
//!        │ (RocksDB)│   │  (AMQP)  │   │ (external)   │
//!        └──────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! Result events arrive on the reply topics in [`commands::topics`] and are
//! applied by the functions in [`handlers`], wired to the bus with
//! [`handlers::event_router`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use valinfra_bus::{AmqpBus, BusConfig};
//! use valinfra_control::{ControlPlane, ControlPlaneService, CreateSnapshotRequest};
//! use valinfra_core::{Requester, UserId};
//! use valinfra_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/valinfra")?);
//! let bus = Arc::new(AmqpBus::connect(BusConfig::default()).await?);
//! let control = ControlPlaneService::with_defaults(store, bus);
//!
//! let requester = Requester::user(UserId::from_bytes([0u8; 32]));
//! let request = CreateSnapshotRequest::new("nightly", "cosmoshub-4", "vol-1");
//! let snapshot = control.create_snapshot(&requester, request).await?;
//!
//! println!("Requested snapshot: {}", snapshot.snapshot_id);
//! # Ok(())
//! # }
//! ```
//!
//! See the [`lifecycle`] module for the transition rules.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod chain_client;
pub mod commands;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lifecycle;
pub mod schedule;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use chain_client::{ChainClient, HttpChainClient, ValidatorInfo};
pub use error::{ControlError, ErrorKind, Result};
pub use handlers::{event_router, DriverEvent, DriverEventHandler};
pub use lifecycle::Rejection;
pub use schedule::{CronSchedule, ScheduleError};
pub use service::{ControlPlane, ControlPlaneService};
pub use types::{
    ControlConfig, CreateNodeRequest, CreateProjectRequest, CreateSnapshotRequest, EventOutcome,
    Listing, NetworkSummary, Page,
};

// Re-export commonly used types from dependencies for convenience
pub use valinfra_core::{NodeId, ProjectId, Requester, SnapshotId, UserId};
pub use valinfra_store::{Node, NodeStatus, Project, Snapshot, SnapshotStatus, UpdateStatus};
