//! Driver result events.
//!
//! Every event names the resource it concerns and either carries an `error`
//! object (the driver failed) or the success fields of that operation under
//! `data`. Node create events may carry partial provisioning artifacts in
//! `data` alongside an `error`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use valinfra_bus::Event;
use valinfra_core::{NodeId, SnapshotId};

use crate::error::{ControlError, Result};

/// Failure reported by a driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriverError {
    /// Human-readable message.
    #[serde(default = "unknown_message")]
    pub message: String,
    /// Structured detail, kept verbatim.
    #[serde(default)]
    pub detail: Option<Value>,
}

fn unknown_message() -> String {
    "driver reported an error without a message".to_string()
}

/// Cloud identifiers reported by the snapshot driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SnapshotCloudIds {
    /// Cloud snapshot ID.
    #[serde(default)]
    pub snapshot_cloud_id: Option<String>,
    /// Cloud volume ID.
    #[serde(default)]
    pub volume_cloud_id: Option<String>,
    /// Cloud droplet ID.
    #[serde(default)]
    pub droplet_cloud_id: Option<String>,
}

/// A snapshot driver result.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotEvent {
    /// The snapshot the result is for.
    pub snapshot_id: SnapshotId,
    /// Present when the driver failed.
    #[serde(default)]
    pub error: Option<DriverError>,
    /// Success fields.
    #[serde(default)]
    pub data: Option<SnapshotCloudIds>,
}

/// Provisioning artifacts reported by the node driver.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NodeArtifacts {
    /// Data volume.
    #[serde(default)]
    pub volume: Option<Value>,
    /// Droplet.
    #[serde(default)]
    pub droplet: Option<Value>,
    /// Full-node connection info.
    #[serde(default)]
    pub fullnode_info: Option<Value>,
    /// Driver progress record, used to resume a failed creation.
    #[serde(default)]
    pub process: Option<Value>,
}

/// A node or monitoring driver result.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEvent {
    /// The node the result is for.
    pub node_id: NodeId,
    /// Present when the driver failed.
    #[serde(default)]
    pub error: Option<DriverError>,
    /// Artifacts, on success or partial failure.
    #[serde(default)]
    pub data: Option<NodeArtifacts>,
}

/// Decode an event body into a typed driver result.
///
/// # Errors
///
/// Returns `ControlError::InvalidEvent` if the body does not have the expected shape.
pub fn decode<T: DeserializeOwned>(event: &Event) -> Result<T> {
    T::deserialize(&event.body).map_err(|e| {
        ControlError::InvalidEvent(format!("{} on {}", e, event.routing_key))
    })
}

/// Require a success field that the driver must send.
///
/// # Errors
///
/// Returns `ControlError::InvalidEvent` naming the missing field.
pub fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| ControlError::InvalidEvent(format!("missing {field} on success")))
}
