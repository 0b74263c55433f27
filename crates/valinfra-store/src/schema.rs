//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary project records, keyed by `project_id`.
    pub const PROJECTS: &str = "projects";

    /// Index: projects by owner, keyed by `user_id || project_id`.
    pub const PROJECTS_BY_USER: &str = "projects_by_user";

    /// Primary snapshot records, keyed by `snapshot_id`.
    pub const SNAPSHOTS: &str = "snapshots";

    /// Index: snapshots by status, keyed by `status || snapshot_id`.
    pub const SNAPSHOTS_BY_STATUS: &str = "snapshots_by_status";

    /// Index: snapshots by owner, keyed by `user_id || snapshot_id`.
    pub const SNAPSHOTS_BY_USER: &str = "snapshots_by_user";

    /// Primary node records, keyed by `node_id`.
    pub const NODES: &str = "nodes";

    /// Index: nodes by owner, keyed by `user_id || node_id`.
    pub const NODES_BY_USER: &str = "nodes_by_user";

    /// Index: nodes by project, keyed by `project_id || node_id`.
    pub const NODES_BY_PROJECT: &str = "nodes_by_project";

    /// Network setup configurations, keyed by network name.
    pub const NETWORK_CONFIGS: &str = "network_configs";

    /// Validator monitoring registrations, keyed by `monitor_id`.
    pub const MONITORS: &str = "monitors";

    /// Index: monitors by node, keyed by `node_id || monitor_id`.
    pub const MONITORS_BY_NODE: &str = "monitors_by_node";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::PROJECTS,
        cf::PROJECTS_BY_USER,
        cf::SNAPSHOTS,
        cf::SNAPSHOTS_BY_STATUS,
        cf::SNAPSHOTS_BY_USER,
        cf::NODES,
        cf::NODES_BY_USER,
        cf::NODES_BY_PROJECT,
        cf::NETWORK_CONFIGS,
        cf::MONITORS,
        cf::MONITORS_BY_NODE,
    ]
}
