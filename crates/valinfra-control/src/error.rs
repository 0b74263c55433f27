//! Error types for the lifecycle core.
//!
//! Errors fall into the classes reported by [`ControlError::kind`]. Driver
//! failures are not errors here: they arrive as event data and are recorded on
//! the resource.

use thiserror::Error;
use valinfra_core::{NodeId, ProjectId, SnapshotId, UserId};
use valinfra_store::StoreError;

use crate::lifecycle::Rejection;
use crate::schedule::ScheduleError;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was refused before any state changed.
    Validation,
    /// A message or remote call could not be delivered, decoded or answered.
    Transport,
    /// The document store failed.
    Store,
    /// An unexpected internal condition.
    Internal,
}

/// Errors that can occur in lifecycle operations and event handling.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested project was not found.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// The requested snapshot was not found.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    /// The requested node was not found.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// No setup configuration exists for the network.
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// The requester neither owns the resource nor is an admin.
    #[error("user {user_id} may not access {resource}")]
    NotOwner {
        /// The user making the request.
        user_id: UserId,
        /// The resource being accessed.
        resource: String,
    },

    /// The state machine refused the request.
    #[error("{resource}: {reason}")]
    Rejected {
        /// The resource the request targeted.
        resource: String,
        /// Why the request was refused.
        reason: Rejection,
    },

    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A cron expression could not be parsed.
    #[error(transparent)]
    InvalidSchedule(#[from] ScheduleError),

    /// An event payload could not be decoded or lacks required fields.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The chain REST endpoint failed or answered unexpectedly.
    #[error("chain query failed: {0}")]
    Chain(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Message bus error.
    #[error("bus error: {0}")]
    Bus(#[from] valinfra_bus::BusError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Build a rejection error for `resource`.
    #[must_use]
    pub fn rejected(resource: impl Into<String>, reason: Rejection) -> Self {
        Self::Rejected {
            resource: resource.into(),
            reason,
        }
    }

    /// Replace a store `NotFound` with a resource-specific error.
    pub(crate) fn or_not_found(self, missing: impl FnOnce() -> Self) -> Self {
        match self {
            Self::Store(StoreError::NotFound) => missing(),
            other => other,
        }
    }

    /// The class this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectNotFound(_)
            | Self::SnapshotNotFound(_)
            | Self::NodeNotFound(_)
            | Self::NetworkNotFound(_)
            | Self::NotOwner { .. }
            | Self::Rejected { .. }
            | Self::InvalidRequest(_)
            | Self::InvalidSchedule(_) => ErrorKind::Validation,
            Self::InvalidEvent(_) | Self::Chain(_) | Self::Bus(_) => ErrorKind::Transport,
            Self::Store(_) => ErrorKind::Store,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ProjectNotFound(_)
            | Self::SnapshotNotFound(_)
            | Self::NodeNotFound(_)
            | Self::NetworkNotFound(_) => 404,
            Self::NotOwner { .. } => 403,
            Self::Rejected { .. } => 409,
            Self::InvalidRequest(_) | Self::InvalidSchedule(_) | Self::InvalidEvent(_) => 400,
            Self::Chain(_) => 502,
            Self::Bus(_) => 503,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Bus(_) | Self::Chain(_) | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes_and_status_codes() {
        let snapshot_id = SnapshotId::from_bytes([1u8; 32]);
        let user_id = UserId::from_bytes([2u8; 32]);

        let missing = ControlError::SnapshotNotFound(snapshot_id);
        assert_eq!(missing.http_status_code(), 404);
        assert_eq!(missing.kind(), ErrorKind::Validation);

        let not_owner = ControlError::NotOwner {
            user_id,
            resource: format!("snapshot {snapshot_id}"),
        };
        assert_eq!(not_owner.http_status_code(), 403);

        let rejected = ControlError::rejected("snapshot x", Rejection::SnapshotNotCreated);
        assert_eq!(rejected.http_status_code(), 409);
        assert_eq!(rejected.to_string(), "snapshot x: snapshot not created");
        assert!(!rejected.is_retriable());

        let bus = ControlError::Bus(valinfra_bus::BusError::Closed);
        assert_eq!(bus.kind(), ErrorKind::Transport);
        assert!(bus.is_retriable());

        let store = ControlError::Store(StoreError::Database("io".into()));
        assert_eq!(store.kind(), ErrorKind::Store);
    }

    #[test]
    fn store_not_found_is_specialized() {
        let node_id = NodeId::from_bytes([3u8; 32]);
        let err = ControlError::Store(StoreError::NotFound)
            .or_not_found(|| ControlError::NodeNotFound(node_id));
        assert!(matches!(err, ControlError::NodeNotFound(id) if id == node_id));

        let err = ControlError::Internal("x".into())
            .or_not_found(|| ControlError::NodeNotFound(node_id));
        assert!(matches!(err, ControlError::Internal(_)));
    }
}
