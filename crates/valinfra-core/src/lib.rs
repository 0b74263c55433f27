//! Core types for valinfra.
//!
//! This crate provides the vocabulary shared by every other valinfra crate:
//!
//! - **Identifiers**: strongly-typed IDs for users, projects, snapshots, nodes and monitors
//! - **Requesters**: the authenticated caller and its role, used for ownership checks
//!
//! # Example
//!
//! ```
//! use valinfra_core::{Requester, SnapshotId, UserId};
//!
//! let user_id = UserId::from_hex(
//!     "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
//! ).unwrap();
//!
//! let snapshot_id = SnapshotId::generate(&user_id, "cosmoshub-nightly");
//! let requester = Requester::user(user_id);
//!
//! assert!(requester.can_access(&user_id));
//! assert_eq!(SnapshotId::from_hex(&snapshot_id.to_hex()).unwrap(), snapshot_id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod requester;

pub use ids::{IdError, MonitorId, NodeId, ProjectId, SnapshotId, UserId};
pub use requester::{Requester, Role};
