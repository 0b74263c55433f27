//! Documents stored in the database.
//!
//! These types are the persisted shape of projects, snapshots, nodes, network
//! setup configurations and monitoring registrations. Status enums serialize as
//! `SCREAMING_SNAKE_CASE` strings, which is also how they appear on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use valinfra_core::{MonitorId, NodeId, ProjectId, SnapshotId, UserId};

// =============================================================================
// Projects
// =============================================================================

/// A named grouping container for nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub project_id: ProjectId,
    /// Owner.
    pub user_id: UserId,
    /// Human-readable name.
    pub name: String,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// Number of non-deleted nodes attached to the project.
    pub node_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle states of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    /// The project is usable.
    Created,
    /// The project was deleted.
    Deleted,
}

// =============================================================================
// Snapshots
// =============================================================================

/// A disk snapshot of a fully synced chain node, used to bootstrap validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier.
    pub snapshot_id: SnapshotId,
    /// Owner.
    pub user_id: UserId,
    /// Human-readable name.
    pub name: String,
    /// Network (chain) this snapshot belongs to.
    pub network: String,
    /// Primary lifecycle status.
    pub status: SnapshotStatus,
    /// Refresh status; `None` until the first refresh is requested.
    #[serde(default)]
    pub update_status: Option<UpdateStatus>,
    /// Cloud volume the snapshot is taken from.
    pub volume_cloud_id: String,
    /// Cloud snapshot ID, set once the driver reports a successful create.
    #[serde(default)]
    pub snapshot_cloud_id: Option<String>,
    /// Cloud droplet used by the driver while taking the snapshot.
    #[serde(default)]
    pub droplet_cloud_id: Option<String>,
    /// Free-form tags forwarded to the cloud provider.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cron expression for periodic refresh.
    #[serde(default)]
    pub cron_time: Option<String>,
    /// Message from the last failed driver operation.
    #[serde(default)]
    pub message: Option<String>,
    /// Structured detail from the last failed driver operation.
    #[serde(default)]
    pub detail: Option<Value>,
    /// Message from the last failed refresh, kept apart from `message`.
    #[serde(default)]
    pub update_message: Option<String>,
    /// Structured detail from the last failed refresh.
    #[serde(default)]
    pub update_detail: Option<Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the driver's create result was applied.
    #[serde(default)]
    pub create_processed_at: Option<DateTime<Utc>>,
    /// When the driver's delete result was applied.
    #[serde(default)]
    pub delete_processed_at: Option<DateTime<Utc>>,
    /// When the driver's last update result was applied.
    #[serde(default)]
    pub update_processed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Returns true if a refresh has been requested and not yet answered.
    #[must_use]
    pub fn is_update_pending(&self) -> bool {
        self.update_status == Some(UpdateStatus::UpdatePending)
    }
}

/// Primary lifecycle states of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum SnapshotStatus {
    /// Create command sent, awaiting the driver.
    CreatePending = 1,
    /// The driver reported a failed create.
    CreateFail = 2,
    /// The snapshot exists in the cloud.
    Created = 3,
    /// Delete command sent, awaiting the driver.
    DeletePending = 4,
    /// The driver reported a failed delete.
    DeleteFail = 5,
    /// The snapshot is gone.
    Deleted = 6,
}

impl SnapshotStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `SnapshotStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::CreatePending),
            2 => Some(Self::CreateFail),
            3 => Some(Self::Created),
            4 => Some(Self::DeletePending),
            5 => Some(Self::DeleteFail),
            6 => Some(Self::Deleted),
            _ => None,
        }
    }

    /// The wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePending => "CREATE_PENDING",
            Self::CreateFail => "CREATE_FAIL",
            Self::Created => "CREATED",
            Self::DeletePending => "DELETE_PENDING",
            Self::DeleteFail => "DELETE_FAIL",
            Self::Deleted => "DELETED",
        }
    }
}

/// Refresh status of a snapshot, orthogonal to its primary status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    /// Update command sent, awaiting the driver.
    UpdatePending,
    /// The driver reported a failed refresh.
    UpdateFail,
    /// The last refresh succeeded.
    Updated,
}

impl UpdateStatus {
    /// The wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdatePending => "UPDATE_PENDING",
            Self::UpdateFail => "UPDATE_FAIL",
            Self::Updated => "UPDATED",
        }
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A validator/full node provisioned from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier.
    pub node_id: NodeId,
    /// Owner.
    pub user_id: UserId,
    /// Project the node belongs to, if any.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// Snapshot the node was provisioned from.
    pub snapshot_id: SnapshotId,
    /// Network (chain) of the node, inherited from the snapshot.
    pub network: String,
    /// Human-readable name.
    pub name: String,
    /// Validator moniker.
    pub moniker: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Disk size.
    pub size_gigabytes: u32,
    /// Cloud region.
    pub region: String,
    /// File system of the data volume.
    pub file_system_type: String,
    /// Free-form tags forwarded to the cloud provider.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Lifecycle status.
    pub status: NodeStatus,
    /// Message from the last failed driver operation.
    #[serde(default)]
    pub message: Option<String>,
    /// Structured detail from the last failed driver operation.
    #[serde(default)]
    pub detail: Option<Value>,
    /// Provisioned data volume, as reported by the driver.
    #[serde(default)]
    pub volume: Option<Value>,
    /// Provisioned droplet, as reported by the driver.
    #[serde(default)]
    pub droplet: Option<Value>,
    /// Full-node connection info, as reported by the driver.
    #[serde(default)]
    pub fullnode_info: Option<Value>,
    /// Driver-side progress record used to resume a failed creation.
    #[serde(default)]
    pub create_process: Option<Value>,
    /// Validator identity attached to the node.
    #[serde(default)]
    pub validator: Option<Validator>,
    /// Monitoring registration state.
    #[serde(default)]
    pub monitoring: Option<Monitoring>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the driver's last create result was applied.
    #[serde(default)]
    pub create_processed_at: Option<DateTime<Utc>>,
    /// When the driver's delete result was applied.
    #[serde(default)]
    pub delete_processed_at: Option<DateTime<Utc>>,
}

/// Lifecycle states of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum NodeStatus {
    /// Fresh create command sent, awaiting the driver.
    CreatePending = 1,
    /// The driver reported a failed create.
    CreateFail = 2,
    /// Retry of a failed create sent, awaiting the driver.
    CreateRetrying = 3,
    /// The node is provisioned.
    Created = 4,
    /// Delete command sent, awaiting the driver.
    DeletePending = 5,
    /// The driver reported a failed delete.
    DeleteFail = 6,
    /// The node is gone.
    Deleted = 7,
}

impl NodeStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePending => "CREATE_PENDING",
            Self::CreateFail => "CREATE_FAIL",
            Self::CreateRetrying => "CREATE_RETRYING",
            Self::Created => "CREATED",
            Self::DeletePending => "DELETE_PENDING",
            Self::DeleteFail => "DELETE_FAIL",
            Self::Deleted => "DELETED",
        }
    }
}

/// Validator identity attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Operator (valoper) address.
    pub validator_address: String,
    /// Account address of the operator, used to find the self delegation.
    #[serde(default)]
    pub account_address: Option<String>,
    /// Consensus public key, if known.
    #[serde(default)]
    pub consensus_pubkey: Option<String>,
}

/// Monitoring registration state of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitoring {
    /// Registration status.
    pub status: MonitoringStatus,
    /// Failure message from the monitoring driver.
    #[serde(default)]
    pub message: Option<String>,
    /// Structured failure detail from the monitoring driver.
    #[serde(default)]
    pub detail: Option<Value>,
    /// When the driver's result was applied.
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Status of a monitoring registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitoringStatus {
    /// Registration sent, awaiting the driver.
    RegisterPending,
    /// The driver reported a failed registration.
    RegisterFail,
    /// The validator is monitored.
    Registered,
}

impl MonitoringStatus {
    /// The wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegisterPending => "REGISTER_PENDING",
            Self::RegisterFail => "REGISTER_FAIL",
            Self::Registered => "REGISTERED",
        }
    }
}

/// A record of a validator attached to a node for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorMonitor {
    /// Unique identifier.
    pub monitor_id: MonitorId,
    /// Node the validator runs on.
    pub node_id: NodeId,
    /// Owner.
    pub user_id: UserId,
    /// Network of the node.
    pub network: String,
    /// Operator address of the validator.
    pub validator_address: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Network setup configuration
// =============================================================================

/// Per-network provisioning parameters, seeded by operators and read-only to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSetupConfig {
    /// Network key, e.g. `cosmoshub-4`.
    pub network: String,
    /// Display name.
    pub name: String,
    /// Container that runs the chain daemon on provisioned droplets.
    pub container_name: String,
    /// Setup script the driver runs on new droplets.
    #[serde(default)]
    pub setup_script: Option<String>,
    /// Command the driver uses to query sync status.
    #[serde(default)]
    pub status_command: Option<String>,
    /// Default disk size for new nodes.
    pub default_size_gigabytes: u32,
    /// Chain parameters for validator queries.
    pub chain: ChainParams,
}

/// Chain-level parameters of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Chain ID.
    pub chain_id: String,
    /// Base URL of the chain's REST (LCD) endpoint.
    pub rest_url: String,
    /// Staking denomination.
    pub denom: String,
    /// Decimal exponent of the staking denomination.
    pub decimals: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            SnapshotStatus::CreatePending,
            SnapshotStatus::CreateFail,
            SnapshotStatus::Created,
            SnapshotStatus::DeletePending,
            SnapshotStatus::DeleteFail,
            SnapshotStatus::Deleted,
        ] {
            assert_eq!(SnapshotStatus::from_u8(status.as_u8()), Some(status));
        }
        assert_eq!(SnapshotStatus::from_u8(0), None);
    }

    #[test]
    fn statuses_use_wire_names() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::CreateRetrying).unwrap(),
            "\"CREATE_RETRYING\""
        );
        assert_eq!(
            serde_json::to_string(&UpdateStatus::UpdatePending).unwrap(),
            format!("\"{}\"", UpdateStatus::UpdatePending.as_str())
        );
        let status: SnapshotStatus = serde_json::from_str("\"DELETE_FAIL\"").unwrap();
        assert_eq!(status, SnapshotStatus::DeleteFail);
        assert_eq!(status.as_str(), "DELETE_FAIL");
    }
}
