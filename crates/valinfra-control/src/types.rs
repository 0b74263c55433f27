//! Request, response and configuration types for the lifecycle core.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use valinfra_core::{ProjectId, SnapshotId};

/// Configuration for the lifecycle service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Page size used when a listing does not specify one.
    pub default_page_limit: usize,
    /// Largest page size a listing may ask for.
    pub max_page_limit: usize,
    /// Timeout for chain REST queries.
    pub chain_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 20,
            max_page_limit: 100,
            chain_timeout: Duration::from_secs(10),
        }
    }
}

impl ControlConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `CHAIN_TIMEOUT_SECONDS`; other fields keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CHAIN_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse::<u64>() {
                if n > 0 {
                    config.chain_timeout = Duration::from_secs(n);
                }
            }
        }

        config
    }
}

/// Request to create a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    /// Human-readable name.
    pub name: String,
}

/// Request to create a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    /// Human-readable name.
    pub name: String,
    /// Network the snapshot belongs to.
    pub network: String,
    /// Cloud volume to take the snapshot from.
    pub volume_cloud_id: String,
    /// Tags forwarded to the cloud provider.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional refresh schedule.
    #[serde(default)]
    pub cron_time: Option<String>,
}

impl CreateSnapshotRequest {
    /// Create a request with no tags and no schedule.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        network: impl Into<String>,
        volume_cloud_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            network: network.into(),
            volume_cloud_id: volume_cloud_id.into(),
            tags: Vec::new(),
            cron_time: None,
        }
    }

    /// Set the refresh schedule.
    #[must_use]
    pub fn with_cron(mut self, cron_time: impl Into<String>) -> Self {
        self.cron_time = Some(cron_time.into());
        self
    }
}

/// Request to create a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    /// Human-readable name.
    pub name: String,
    /// Validator moniker.
    pub moniker: String,
    /// Snapshot to bootstrap from.
    pub snapshot_id: SnapshotId,
    /// Project to attach the node to.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Disk size; defaults to the network's configured size.
    #[serde(default)]
    pub size_gigabytes: Option<u32>,
    /// Cloud region.
    pub region: String,
    /// File system of the data volume.
    #[serde(default = "default_file_system_type")]
    pub file_system_type: String,
    /// Tags forwarded to the cloud provider.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_file_system_type() -> String {
    "ext4".to_string()
}

impl CreateNodeRequest {
    /// Create a request with default sizing and no project.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        snapshot_id: SnapshotId,
        region: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            moniker: name.clone(),
            name,
            snapshot_id,
            project_id: None,
            description: None,
            size_gigabytes: None,
            region: region.into(),
            file_system_type: default_file_system_type(),
            tags: Vec::new(),
        }
    }

    /// Attach the node to a project.
    #[must_use]
    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Offset/limit paging for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Number of items to skip.
    #[serde(default)]
    pub offset: usize,
    /// Maximum number of items to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Page {
    /// A page starting at `offset` with at most `limit` items.
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Slice `items` according to this page, clamping the limit.
    #[must_use]
    pub fn apply<T>(&self, items: Vec<T>, config: &ControlConfig) -> Listing<T> {
        let total = items.len();
        let limit = self
            .limit
            .unwrap_or(config.default_page_limit)
            .clamp(1, config.max_page_limit.max(1));
        let items = items.into_iter().skip(self.offset).take(limit).collect();
        Listing {
            items,
            offset: self.offset,
            limit,
            total,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Offset of the first item.
    pub offset: usize,
    /// Effective page size.
    pub limit: usize,
    /// Number of items across all pages.
    pub total: usize,
}

/// A network a snapshot or node can be created on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    /// Network key.
    pub network: String,
    /// Display name.
    pub name: String,
}

/// What applying a driver event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event moved the resource to `status`.
    Applied {
        /// Hex ID of the resource.
        resource_id: String,
        /// Status after the event.
        status: &'static str,
    },
    /// The event did not match the resource's state and was dropped.
    Ignored {
        /// Hex ID of the resource.
        resource_id: String,
        /// Status the resource was left in.
        status: &'static str,
    },
}

impl EventOutcome {
    pub(crate) fn applied(resource_id: impl ToString, status: &'static str) -> Self {
        Self::Applied {
            resource_id: resource_id.to_string(),
            status,
        }
    }

    pub(crate) fn ignored(resource_id: impl ToString, status: &'static str) -> Self {
        Self::Ignored {
            resource_id: resource_id.to_string(),
            status,
        }
    }

    /// Returns true if the event changed state.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
