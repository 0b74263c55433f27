//! `RocksDB` document store for valinfra.
//!
//! This crate persists projects, snapshots, nodes, network setup configurations
//! and validator monitoring records, with the secondary indexes the lifecycle
//! core and the reconciler query by.
//!
//! # Atomic read-modify-write
//!
//! Every state transition goes through one of the `update_*` methods. They read
//! the current document, hand a mutable copy to a closure, and persist the copy
//! only if the closure returned `Ok` and actually changed something. All writers
//! are serialized, so a closure always sees the latest committed state and two
//! concurrent transitions on the same document cannot interleave.
//!
//! # Example
//!
//! ```no_run
//! use valinfra_store::{RocksStore, SnapshotStatus, Store, StoreError};
//! use valinfra_core::SnapshotId;
//!
//! # fn example(id: SnapshotId) -> Result<(), StoreError> {
//! let store = RocksStore::open("/tmp/valinfra")?;
//! let applied = store.update_snapshot(&id, |snapshot| {
//!     if snapshot.status != SnapshotStatus::CreatePending {
//!         return Ok(false);
//!     }
//!     snapshot.status = SnapshotStatus::Created;
//!     Ok::<_, StoreError>(true)
//! })?;
//! # let _ = applied;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    ChainParams, Monitoring, MonitoringStatus, NetworkSetupConfig, Node, NodeStatus, Project,
    ProjectStatus, Snapshot, SnapshotStatus, UpdateStatus, Validator, ValidatorMonitor,
};

use valinfra_core::{NodeId, ProjectId, SnapshotId, UserId};

/// The storage trait for valinfra documents.
///
/// All operations are synchronous; the `RocksDB` calls underneath are fast enough
/// that the async callers run them inline.
pub trait Store: Send + Sync {
    // =========================================================================
    // Project Operations
    // =========================================================================

    /// Insert or replace a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_project(&self, project: &Project) -> Result<()>;

    /// Get a project by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_project(&self, project_id: &ProjectId) -> Result<Option<Project>>;

    /// List all projects owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_projects_by_user(&self, user_id: &UserId) -> Result<Vec<Project>>;

    /// List every project.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_projects(&self) -> Result<Vec<Project>>;

    /// Atomically read, modify and persist a project.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` (converted into `E`) if the project does not
    /// exist, or whatever error the closure returns.
    fn update_project<T, E, F>(&self, project_id: &ProjectId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Project) -> std::result::Result<T, E>,
        E: From<StoreError>;

    // =========================================================================
    // Snapshot Operations
    // =========================================================================

    /// Insert or replace a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Get a snapshot by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>>;

    /// List all snapshots owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_snapshots_by_user(&self, user_id: &UserId) -> Result<Vec<Snapshot>>;

    /// List all snapshots with the given primary status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_snapshots_by_status(&self, status: SnapshotStatus) -> Result<Vec<Snapshot>>;

    /// List every snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Atomically read, modify and persist a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` (converted into `E`) if the snapshot does not
    /// exist, or whatever error the closure returns.
    fn update_snapshot<T, E, F>(&self, snapshot_id: &SnapshotId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Snapshot) -> std::result::Result<T, E>,
        E: From<StoreError>;

    /// Mark a batch of snapshots as `UPDATE_PENDING` in one atomic write.
    ///
    /// Each snapshot is re-checked inside the atomic section: only those that are
    /// still `CREATED` and not already pending are marked. Returns the marked
    /// snapshots in their new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    fn mark_snapshots_update_pending(&self, snapshot_ids: &[SnapshotId]) -> Result<Vec<Snapshot>>;

    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Insert or replace a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_node(&self, node: &Node) -> Result<()>;

    /// Get a node by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_node(&self, node_id: &NodeId) -> Result<Option<Node>>;

    /// List all nodes owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_user(&self, user_id: &UserId) -> Result<Vec<Node>>;

    /// List all nodes attached to a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_project(&self, project_id: &ProjectId) -> Result<Vec<Node>>;

    /// List every node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_nodes(&self) -> Result<Vec<Node>>;

    /// Atomically read, modify and persist a node.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` (converted into `E`) if the node does not
    /// exist, or whatever error the closure returns.
    fn update_node<T, E, F>(&self, node_id: &NodeId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Node) -> std::result::Result<T, E>,
        E: From<StoreError>;

    // =========================================================================
    // Network Configuration Operations
    // =========================================================================

    /// Insert or replace a network setup configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_network_config(&self, config: &NetworkSetupConfig) -> Result<()>;

    /// Get the setup configuration of a network.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_network_config(&self, network: &str) -> Result<Option<NetworkSetupConfig>>;

    /// List every network setup configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_network_configs(&self) -> Result<Vec<NetworkSetupConfig>>;

    // =========================================================================
    // Monitoring Operations
    // =========================================================================

    /// Insert or replace a validator monitoring record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_validator_monitor(&self, monitor: &ValidatorMonitor) -> Result<()>;

    /// List all monitoring records of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_validator_monitors_by_node(&self, node_id: &NodeId) -> Result<Vec<ValidatorMonitor>>;
}
