//! Driver commands and the topics their results come back on.

use serde_json::{json, Value};
use valinfra_bus::Command;
use valinfra_store::{NetworkSetupConfig, Node, Snapshot, UpdateStatus, Validator};

/// Routing keys of driver commands.
pub mod routing {
    /// Take a snapshot of a volume.
    pub const CREATE_SNAPSHOT: &str = "driver.snapshot.request.create_snapshot";
    /// Delete a cloud snapshot.
    pub const DELETE_SNAPSHOT: &str = "driver.snapshot.request.delete_snapshot";
    /// Refresh a cloud snapshot from its volume.
    pub const UPDATE_SNAPSHOT: &str = "driver.snapshot.request.update_snapshot";
    /// Provision a node from scratch.
    pub const CREATE_NODE: &str = "driver.node.request.create_node";
    /// Resume a partially provisioned node.
    pub const RESUME_CREATE_NODE: &str = "driver.node.request.resume_create_node";
    /// Tear down a node.
    pub const DELETE_NODE: &str = "driver.node.request.delete_node";
    /// Register a validator with monitoring.
    pub const REGISTER_VALIDATOR: &str = "driver.monitoring.request.register_validator";
}

/// Reply topics the drivers publish results to.
pub mod topics {
    /// Results of snapshot creation.
    pub const SNAPSHOT_CREATED: &str = "validatorservice.events.create_snapshot";
    /// Results of snapshot deletion.
    pub const SNAPSHOT_DELETED: &str = "validatorservice.events.delete_snapshot";
    /// Results of snapshot refresh.
    pub const SNAPSHOT_UPDATED: &str = "validatorservice.events.update_snapshot";
    /// Results of node creation, fresh or resumed.
    pub const NODE_CREATED: &str = "validatorservice.events.create_node";
    /// Results of node deletion.
    pub const NODE_DELETED: &str = "validatorservice.events.delete_node";
    /// Results of monitoring registration.
    pub const MONITORING_REGISTERED: &str = "validatorservice.events.register_monitoring";

    /// Every reply topic, for binding the inbox.
    pub const ALL: [&str; 6] = [
        SNAPSHOT_CREATED,
        SNAPSHOT_DELETED,
        SNAPSHOT_UPDATED,
        NODE_CREATED,
        NODE_DELETED,
        MONITORING_REGISTERED,
    ];
}

/// Name of the durable inbox all reply topics are bound to.
pub const EVENT_INBOX: &str = "validatorservice.events";

/// Command to create `snapshot`.
#[must_use]
pub fn create_snapshot(snapshot: &Snapshot) -> Command {
    Command::new(
        routing::CREATE_SNAPSHOT,
        json!({
            "snapshot_id": snapshot.snapshot_id,
            "snapshot": {
                "name": snapshot.name,
                "volume_cloud_id": snapshot.volume_cloud_id,
                "network": snapshot.network,
                "tags": snapshot.tags,
            },
        }),
        topics::SNAPSHOT_CREATED,
    )
}

/// Command to delete `snapshot`.
#[must_use]
pub fn delete_snapshot(snapshot: &Snapshot) -> Command {
    Command::new(
        routing::DELETE_SNAPSHOT,
        json!({ "snapshot_id": snapshot.snapshot_id }),
        topics::SNAPSHOT_DELETED,
    )
}

/// Command to refresh `snapshot` using its network's container.
#[must_use]
pub fn update_snapshot(snapshot: &Snapshot, config: &NetworkSetupConfig) -> Command {
    Command::new(
        routing::UPDATE_SNAPSHOT,
        json!({
            "snapshot_id": snapshot.snapshot_id,
            "snapshot": {
                "volume_cloud_id": snapshot.volume_cloud_id,
                "network": snapshot.network,
            },
            "setup_config": {
                "network": config.network,
                "container_name": config.container_name,
            },
        }),
        topics::SNAPSHOT_UPDATED,
    )
}

/// Notification forwarded to an update requester once a refresh succeeded.
#[must_use]
pub fn update_completed(reply_to: &str, snapshot: &Snapshot) -> Command {
    Command::notification(
        reply_to,
        json!({
            "snapshot_id": snapshot.snapshot_id,
            "update_status": UpdateStatus::Updated.as_str(),
            "data": {
                "snapshot_cloud_id": snapshot.snapshot_cloud_id,
                "volume_cloud_id": snapshot.volume_cloud_id,
                "droplet_cloud_id": snapshot.droplet_cloud_id,
            },
        }),
    )
}

/// Command to provision `node` from scratch.
#[must_use]
pub fn create_node(node: &Node, snapshot_cloud_id: &str, config: &NetworkSetupConfig) -> Command {
    Command::new(
        routing::CREATE_NODE,
        json!({
            "node_id": node.node_id,
            "node": {
                "name": node.name,
                "moniker": node.moniker,
                "description": node.description,
                "size_gigabytes": node.size_gigabytes,
                "tags": node.tags,
                "region": node.region,
                "file_system_type": node.file_system_type,
                "network": node.network,
                "snapshot_cloud_id": snapshot_cloud_id,
            },
            "user": { "user_id": node.user_id },
            "setup_config": config,
        }),
        topics::NODE_CREATED,
    )
}

/// Command to resume provisioning `node` from its recorded progress.
#[must_use]
pub fn resume_create_node(node: &Node) -> Command {
    Command::new(
        routing::RESUME_CREATE_NODE,
        json!({
            "node_id": node.node_id,
            "user": { "user_id": node.user_id },
        }),
        topics::NODE_CREATED,
    )
}

/// Command to tear down `node`.
#[must_use]
pub fn delete_node(node: &Node) -> Command {
    Command::new(
        routing::DELETE_NODE,
        json!({ "node_id": node.node_id }),
        topics::NODE_DELETED,
    )
}

/// Command to register `validator`, running on `node`, with monitoring.
#[must_use]
pub fn register_validator(node: &Node, validator: &Validator) -> Command {
    Command::new(
        routing::REGISTER_VALIDATOR,
        json!({
            "node_id": node.node_id,
            "network": node.network,
            "validator": validator,
            "fullnode_info": node.fullnode_info.clone().unwrap_or(Value::Null),
        }),
        topics::MONITORING_REGISTERED,
    )
}
