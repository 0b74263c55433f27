//! Lifecycle state machines.
//!
//! Every rule here is a pure function of the current status. Request rules
//! return the next status or a [`Rejection`]; event rules return the status a
//! driver result moves the resource to. Event rules with a precondition return
//! `None` when the result does not match the current state and must be ignored
//! as stale.
//!
//! # Snapshots
//!
//! ```text
//!              create             ok
//!   (none) ───────────▶ CREATE_PENDING ───────▶ CREATED ◀──────┐
//!                            │ err                 │ delete      │
//!                            ▼                     ▼             │ err
//!                       CREATE_FAIL ─delete─▶ DELETE_PENDING ─▶ DELETE_FAIL
//!                                                  │ ok
//!                                                  ▼
//!                                               DELETED
//! ```
//!
//! The refresh status (`UPDATE_PENDING`, `UPDATE_FAIL`, `UPDATED`) moves
//! independently, but only while the snapshot is `CREATED`.
//!
//! # Nodes
//!
//! Nodes follow the same shape, with `CREATE_FAIL → CREATE_RETRYING` on retry
//! and `CREATE_RETRYING` resolving like `CREATE_PENDING`.

use valinfra_store::{MonitoringStatus, NodeStatus, ProjectStatus, SnapshotStatus, UpdateStatus};

/// Why the state machine refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The referenced snapshot is not usable yet.
    #[error("snapshot not created")]
    SnapshotNotCreated,
    /// A create is still in flight.
    #[error("resource is still being created")]
    CreateInProgress,
    /// A delete is already in flight.
    #[error("resource is already being deleted")]
    DeleteInProgress,
    /// The resource is gone.
    #[error("resource is already deleted")]
    AlreadyDeleted,
    /// A refresh is already in flight.
    #[error("an update is already pending")]
    UpdateInProgress,
    /// The operation needs a fully created resource.
    #[error("resource is not created")]
    NotCreated,
    /// Only failed creations can be retried.
    #[error("only a failed creation can be retried")]
    NotFailed,
    /// The node has no full-node provisioning record.
    #[error("node has no full-node provisioning record")]
    NoFullnode,
    /// The node has no validator attached.
    #[error("node has no validator attached")]
    NoValidator,
    /// The project still owns nodes.
    #[error("project still has {0} nodes")]
    ProjectHasNodes(u32),
    /// The project is deleted.
    #[error("project is deleted")]
    ProjectDeleted,
}

/// Snapshot rules.
pub mod snapshot {
    use super::{Rejection, SnapshotStatus, UpdateStatus};

    /// Validate a delete request.
    ///
    /// # Errors
    ///
    /// Rejected while a create, delete or refresh is in flight, or once deleted.
    pub const fn request_delete(
        status: SnapshotStatus,
        update_status: Option<UpdateStatus>,
    ) -> Result<SnapshotStatus, Rejection> {
        match status {
            SnapshotStatus::CreatePending => Err(Rejection::CreateInProgress),
            SnapshotStatus::DeletePending => Err(Rejection::DeleteInProgress),
            SnapshotStatus::Deleted => Err(Rejection::AlreadyDeleted),
            _ if matches!(update_status, Some(UpdateStatus::UpdatePending)) => {
                Err(Rejection::UpdateInProgress)
            }
            SnapshotStatus::CreateFail | SnapshotStatus::Created | SnapshotStatus::DeleteFail => {
                Ok(SnapshotStatus::DeletePending)
            }
        }
    }

    /// Validate a refresh request.
    ///
    /// # Errors
    ///
    /// Rejected unless the snapshot is `CREATED` with no refresh in flight.
    pub const fn request_update(
        status: SnapshotStatus,
        update_status: Option<UpdateStatus>,
    ) -> Result<UpdateStatus, Rejection> {
        match (status, update_status) {
            (SnapshotStatus::Created, Some(UpdateStatus::UpdatePending)) => {
                Err(Rejection::UpdateInProgress)
            }
            (SnapshotStatus::Created, _) => Ok(UpdateStatus::UpdatePending),
            _ => Err(Rejection::NotCreated),
        }
    }

    /// Resolve a create result. Applies while `CREATE_PENDING` or `CREATE_FAIL`.
    #[must_use]
    pub const fn on_create_result(status: SnapshotStatus, succeeded: bool) -> Option<SnapshotStatus> {
        match (status, succeeded) {
            (SnapshotStatus::CreatePending | SnapshotStatus::CreateFail, true) => {
                Some(SnapshotStatus::Created)
            }
            (SnapshotStatus::CreatePending | SnapshotStatus::CreateFail, false) => {
                Some(SnapshotStatus::CreateFail)
            }
            _ => None,
        }
    }

    /// Resolve a delete result. Applies while `DELETE_PENDING` or `DELETE_FAIL`.
    #[must_use]
    pub const fn on_delete_result(status: SnapshotStatus, succeeded: bool) -> Option<SnapshotStatus> {
        match (status, succeeded) {
            (SnapshotStatus::DeletePending | SnapshotStatus::DeleteFail, true) => {
                Some(SnapshotStatus::Deleted)
            }
            (SnapshotStatus::DeletePending | SnapshotStatus::DeleteFail, false) => {
                Some(SnapshotStatus::DeleteFail)
            }
            _ => None,
        }
    }

    /// Resolve a refresh result. Every refresh result is applied.
    #[must_use]
    pub const fn on_update_result(succeeded: bool) -> UpdateStatus {
        if succeeded {
            UpdateStatus::Updated
        } else {
            UpdateStatus::UpdateFail
        }
    }

    /// Returns true if the reconciler may schedule a refresh.
    #[must_use]
    pub const fn is_refreshable(status: SnapshotStatus, update_status: Option<UpdateStatus>) -> bool {
        request_update(status, update_status).is_ok()
    }

    /// Returns true if nodes may be provisioned from a snapshot in this status.
    #[must_use]
    pub const fn is_usable(status: SnapshotStatus) -> bool {
        matches!(status, SnapshotStatus::Created)
    }
}

/// Node rules.
pub mod node {
    use super::{MonitoringStatus, NodeStatus, Rejection};

    /// Validate a delete request.
    ///
    /// # Errors
    ///
    /// Rejected while a create or delete is in flight, or once deleted.
    pub const fn request_delete(status: NodeStatus) -> Result<NodeStatus, Rejection> {
        match status {
            NodeStatus::CreatePending | NodeStatus::CreateRetrying => {
                Err(Rejection::CreateInProgress)
            }
            NodeStatus::DeletePending => Err(Rejection::DeleteInProgress),
            NodeStatus::Deleted => Err(Rejection::AlreadyDeleted),
            NodeStatus::CreateFail | NodeStatus::Created | NodeStatus::DeleteFail => {
                Ok(NodeStatus::DeletePending)
            }
        }
    }

    /// Validate a retry request.
    ///
    /// # Errors
    ///
    /// Rejected unless the node is `CREATE_FAIL`.
    pub const fn request_retry(status: NodeStatus) -> Result<NodeStatus, Rejection> {
        match status {
            NodeStatus::CreateFail => Ok(NodeStatus::CreateRetrying),
            _ => Err(Rejection::NotFailed),
        }
    }

    /// Validate attaching a validator.
    ///
    /// # Errors
    ///
    /// Rejected unless the node is `CREATED` and has full-node info.
    pub const fn request_attach_validator(
        status: NodeStatus,
        has_fullnode: bool,
    ) -> Result<MonitoringStatus, Rejection> {
        match (status, has_fullnode) {
            (NodeStatus::Created, true) => Ok(MonitoringStatus::RegisterPending),
            (NodeStatus::Created, false) => Err(Rejection::NoFullnode),
            _ => Err(Rejection::NotCreated),
        }
    }

    /// Resolve a create result.
    ///
    /// Driver create results are authoritative and apply in every status, so a
    /// result arriving after a retry still lands.
    #[must_use]
    pub const fn on_create_result(succeeded: bool) -> NodeStatus {
        if succeeded {
            NodeStatus::Created
        } else {
            NodeStatus::CreateFail
        }
    }

    /// Resolve a delete result. Applies while `DELETE_PENDING` or `DELETE_FAIL`.
    #[must_use]
    pub const fn on_delete_result(status: NodeStatus, succeeded: bool) -> Option<NodeStatus> {
        match (status, succeeded) {
            (NodeStatus::DeletePending | NodeStatus::DeleteFail, true) => Some(NodeStatus::Deleted),
            (NodeStatus::DeletePending | NodeStatus::DeleteFail, false) => {
                Some(NodeStatus::DeleteFail)
            }
            _ => None,
        }
    }

    /// Resolve a monitoring registration result, independent of the node status.
    #[must_use]
    pub const fn on_monitoring_result(succeeded: bool) -> MonitoringStatus {
        if succeeded {
            MonitoringStatus::Registered
        } else {
            MonitoringStatus::RegisterFail
        }
    }
}

/// Project rules.
pub mod project {
    use super::{ProjectStatus, Rejection};

    /// Validate attaching a new node.
    ///
    /// # Errors
    ///
    /// Rejected once the project is deleted.
    pub const fn request_attach_node(status: ProjectStatus) -> Result<(), Rejection> {
        match status {
            ProjectStatus::Created => Ok(()),
            ProjectStatus::Deleted => Err(Rejection::ProjectDeleted),
        }
    }

    /// Validate a delete request.
    ///
    /// # Errors
    ///
    /// Rejected once deleted or while the project still owns nodes.
    pub const fn request_delete(status: ProjectStatus, node_count: u32) -> Result<ProjectStatus, Rejection> {
        match status {
            ProjectStatus::Deleted => Err(Rejection::AlreadyDeleted),
            ProjectStatus::Created if node_count > 0 => Err(Rejection::ProjectHasNodes(node_count)),
            ProjectStatus::Created => Ok(ProjectStatus::Deleted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_SNAPSHOT: [SnapshotStatus; 6] = [
        SnapshotStatus::CreatePending,
        SnapshotStatus::CreateFail,
        SnapshotStatus::Created,
        SnapshotStatus::DeletePending,
        SnapshotStatus::DeleteFail,
        SnapshotStatus::Deleted,
    ];

    const ALL_NODE: [NodeStatus; 7] = [
        NodeStatus::CreatePending,
        NodeStatus::CreateFail,
        NodeStatus::CreateRetrying,
        NodeStatus::Created,
        NodeStatus::DeletePending,
        NodeStatus::DeleteFail,
        NodeStatus::Deleted,
    ];

    #[test]
    fn snapshot_delete_requests() {
        use SnapshotStatus::*;

        assert_eq!(snapshot::request_delete(Created, None), Ok(DeletePending));
        assert_eq!(snapshot::request_delete(CreateFail, None), Ok(DeletePending));
        assert_eq!(snapshot::request_delete(DeleteFail, None), Ok(DeletePending));
        assert_eq!(
            snapshot::request_delete(Created, Some(UpdateStatus::Updated)),
            Ok(DeletePending)
        );

        assert_eq!(
            snapshot::request_delete(CreatePending, None),
            Err(Rejection::CreateInProgress)
        );
        assert_eq!(
            snapshot::request_delete(DeletePending, None),
            Err(Rejection::DeleteInProgress)
        );
        assert_eq!(snapshot::request_delete(Deleted, None), Err(Rejection::AlreadyDeleted));
        assert_eq!(
            snapshot::request_delete(Created, Some(UpdateStatus::UpdatePending)),
            Err(Rejection::UpdateInProgress)
        );
    }

    #[test]
    fn snapshot_update_requests() {
        assert_eq!(
            snapshot::request_update(SnapshotStatus::Created, None),
            Ok(UpdateStatus::UpdatePending)
        );
        assert_eq!(
            snapshot::request_update(SnapshotStatus::Created, Some(UpdateStatus::UpdateFail)),
            Ok(UpdateStatus::UpdatePending)
        );
        assert_eq!(
            snapshot::request_update(SnapshotStatus::Created, Some(UpdateStatus::UpdatePending)),
            Err(Rejection::UpdateInProgress)
        );
        for status in ALL_SNAPSHOT {
            if status != SnapshotStatus::Created {
                assert_eq!(
                    snapshot::request_update(status, None),
                    Err(Rejection::NotCreated)
                );
                assert!(!snapshot::is_refreshable(status, None));
            }
        }
    }

    #[test]
    fn snapshot_events_only_resolve_their_pending_state() {
        for status in ALL_SNAPSHOT {
            let create = snapshot::on_create_result(status, true);
            let delete = snapshot::on_delete_result(status, false);
            match status {
                SnapshotStatus::CreatePending | SnapshotStatus::CreateFail => {
                    assert_eq!(create, Some(SnapshotStatus::Created));
                    assert_eq!(
                        snapshot::on_create_result(status, false),
                        Some(SnapshotStatus::CreateFail)
                    );
                    assert_eq!(delete, None);
                }
                SnapshotStatus::DeletePending | SnapshotStatus::DeleteFail => {
                    assert_eq!(create, None);
                    assert_eq!(delete, Some(SnapshotStatus::DeleteFail));
                    assert_eq!(
                        snapshot::on_delete_result(status, true),
                        Some(SnapshotStatus::Deleted)
                    );
                }
                _ => {
                    assert_eq!(create, None);
                    assert_eq!(delete, None);
                }
            }
        }

        assert_eq!(snapshot::on_update_result(true), UpdateStatus::Updated);
        assert_eq!(snapshot::on_update_result(false), UpdateStatus::UpdateFail);
    }

    #[test]
    fn node_requests() {
        use NodeStatus::*;

        assert_eq!(node::request_delete(Created), Ok(DeletePending));
        assert_eq!(node::request_delete(CreateFail), Ok(DeletePending));
        assert_eq!(node::request_delete(DeleteFail), Ok(DeletePending));
        assert_eq!(node::request_delete(CreatePending), Err(Rejection::CreateInProgress));
        assert_eq!(node::request_delete(CreateRetrying), Err(Rejection::CreateInProgress));
        assert_eq!(node::request_delete(DeletePending), Err(Rejection::DeleteInProgress));
        assert_eq!(node::request_delete(Deleted), Err(Rejection::AlreadyDeleted));

        for status in ALL_NODE {
            let retry = node::request_retry(status);
            if status == CreateFail {
                assert_eq!(retry, Ok(CreateRetrying));
            } else {
                assert_eq!(retry, Err(Rejection::NotFailed));
            }
        }

        assert_eq!(
            node::request_attach_validator(Created, true),
            Ok(MonitoringStatus::RegisterPending)
        );
        assert_eq!(
            node::request_attach_validator(Created, false),
            Err(Rejection::NoFullnode)
        );
        assert_eq!(
            node::request_attach_validator(CreatePending, true),
            Err(Rejection::NotCreated)
        );
    }

    #[test]
    fn node_events() {
        use NodeStatus::*;

        assert_eq!(node::on_create_result(true), Created);
        assert_eq!(node::on_create_result(false), CreateFail);

        for status in ALL_NODE {
            let resolved = node::on_delete_result(status, true);
            if matches!(status, DeletePending | DeleteFail) {
                assert_eq!(resolved, Some(Deleted));
            } else {
                assert_eq!(resolved, None);
            }
        }
        assert_eq!(node::on_delete_result(DeletePending, false), Some(DeleteFail));

        assert_eq!(node::on_monitoring_result(true), MonitoringStatus::Registered);
        assert_eq!(node::on_monitoring_result(false), MonitoringStatus::RegisterFail);
    }

    #[test]
    fn project_requests() {
        assert_eq!(
            project::request_delete(ProjectStatus::Created, 0),
            Ok(ProjectStatus::Deleted)
        );
        assert_eq!(
            project::request_delete(ProjectStatus::Created, 2),
            Err(Rejection::ProjectHasNodes(2))
        );
        assert_eq!(
            project::request_delete(ProjectStatus::Deleted, 0),
            Err(Rejection::AlreadyDeleted)
        );
        assert_eq!(project::request_attach_node(ProjectStatus::Created), Ok(()));
        assert_eq!(
            project::request_attach_node(ProjectStatus::Deleted),
            Err(Rejection::ProjectDeleted)
        );
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(Rejection::SnapshotNotCreated.to_string(), "snapshot not created");
        assert_eq!(
            Rejection::ProjectHasNodes(3).to_string(),
            "project still has 3 nodes"
        );
    }
}
