//! Application of driver result events.
//!
//! Each handler decodes an event, then resolves it inside one atomic store
//! update against the resource's current status. Results that do not match
//! the current status are ignored without writing, which makes duplicate and
//! reordered deliveries harmless.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use valinfra_bus::{CommandBus, Event, EventHandler, EventRouter};
use valinfra_core::ProjectId;
use valinfra_store::{Monitoring, Snapshot, Store, StoreError};

use crate::commands::{self, topics};
use crate::error::{ControlError, Result};
use crate::events::{decode, required, DriverError, NodeEvent, SnapshotCloudIds, SnapshotEvent};
use crate::lifecycle;
use crate::service::ControlPlaneService;
use crate::types::EventOutcome;

/// The kinds of driver result the service consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// Snapshot creation finished.
    SnapshotCreated,
    /// Snapshot deletion finished.
    SnapshotDeleted,
    /// Snapshot refresh finished.
    SnapshotUpdated,
    /// Node creation finished, fresh or resumed.
    NodeCreated,
    /// Node deletion finished.
    NodeDeleted,
    /// Monitoring registration finished.
    MonitoringRegistered,
}

impl DriverEvent {
    /// Every kind, in reply topic order.
    pub const ALL: [Self; 6] = [
        Self::SnapshotCreated,
        Self::SnapshotDeleted,
        Self::SnapshotUpdated,
        Self::NodeCreated,
        Self::NodeDeleted,
        Self::MonitoringRegistered,
    ];

    /// The reply topic this kind arrives on.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::SnapshotCreated => topics::SNAPSHOT_CREATED,
            Self::SnapshotDeleted => topics::SNAPSHOT_DELETED,
            Self::SnapshotUpdated => topics::SNAPSHOT_UPDATED,
            Self::NodeCreated => topics::NODE_CREATED,
            Self::NodeDeleted => topics::NODE_DELETED,
            Self::MonitoringRegistered => topics::MONITORING_REGISTERED,
        }
    }
}

/// Split a driver result into success data or the reported failure.
fn into_result<T>(error: Option<DriverError>, data: Option<T>) -> std::result::Result<Option<T>, DriverError> {
    match error {
        Some(error) => Err(error),
        None => Ok(data),
    }
}

fn record_failure(message: &mut Option<String>, detail: &mut Option<Value>, error: Option<&DriverError>) {
    *message = error.map(|e| e.message.clone());
    *detail = error.and_then(|e| e.detail.clone());
}

fn apply_cloud_ids(snapshot: &mut Snapshot, ids: &SnapshotCloudIds) {
    if let Some(snapshot_cloud_id) = &ids.snapshot_cloud_id {
        snapshot.snapshot_cloud_id = Some(snapshot_cloud_id.clone());
    }
    if let Some(volume_cloud_id) = &ids.volume_cloud_id {
        snapshot.volume_cloud_id.clone_from(volume_cloud_id);
    }
    if let Some(droplet_cloud_id) = &ids.droplet_cloud_id {
        snapshot.droplet_cloud_id = Some(droplet_cloud_id.clone());
    }
}

fn log_outcome(event: &Event, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Applied { resource_id, status } => {
            info!(routing_key = %event.routing_key, resource_id = %resource_id, status, "Applied driver event");
        }
        EventOutcome::Ignored { resource_id, status } => {
            warn!(
                routing_key = %event.routing_key,
                resource_id = %resource_id,
                status,
                "Ignoring stale driver event"
            );
        }
    }
}

impl<S: Store, B: CommandBus> ControlPlaneService<S, B> {
    // =========================================================================
    // Snapshot events
    // =========================================================================

    /// Apply a snapshot create result.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidEvent` for a malformed event or a success
    /// without `data.snapshot_cloud_id`, and `ControlError::SnapshotNotFound`
    /// for an unknown snapshot.
    pub fn apply_snapshot_created(&self, event: &Event, now: DateTime<Utc>) -> Result<EventOutcome> {
        let parsed: SnapshotEvent = decode(event)?;
        let snapshot_id = parsed.snapshot_id;
        let result = into_result(parsed.error, parsed.data);
        if let Ok(data) = &result {
            let data = required(data.as_ref(), "data")?;
            required(data.snapshot_cloud_id.as_ref(), "data.snapshot_cloud_id")?;
        }

        let outcome = self
            .store
            .update_snapshot(&snapshot_id, |snapshot| {
                let Some(next) = lifecycle::snapshot::on_create_result(snapshot.status, result.is_ok())
                else {
                    return Ok(EventOutcome::ignored(snapshot_id, snapshot.status.as_str()));
                };

                snapshot.status = next;
                if let Ok(Some(ids)) = &result {
                    apply_cloud_ids(snapshot, ids);
                }
                record_failure(&mut snapshot.message, &mut snapshot.detail, result.as_ref().err());
                snapshot.create_processed_at = Some(now);
                Ok(EventOutcome::applied(snapshot_id, next.as_str()))
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::SnapshotNotFound(snapshot_id)))?;

        log_outcome(event, &outcome);
        Ok(outcome)
    }

    /// Apply a snapshot delete result.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidEvent` for a malformed event and
    /// `ControlError::SnapshotNotFound` for an unknown snapshot.
    pub fn apply_snapshot_deleted(&self, event: &Event, now: DateTime<Utc>) -> Result<EventOutcome> {
        let parsed: SnapshotEvent = decode(event)?;
        let snapshot_id = parsed.snapshot_id;
        let error = parsed.error;

        let outcome = self
            .store
            .update_snapshot(&snapshot_id, |snapshot| {
                let Some(next) = lifecycle::snapshot::on_delete_result(snapshot.status, error.is_none())
                else {
                    return Ok(EventOutcome::ignored(snapshot_id, snapshot.status.as_str()));
                };

                snapshot.status = next;
                record_failure(&mut snapshot.message, &mut snapshot.detail, error.as_ref());
                snapshot.delete_processed_at = Some(now);
                Ok(EventOutcome::applied(snapshot_id, next.as_str()))
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::SnapshotNotFound(snapshot_id)))?;

        log_outcome(event, &outcome);
        Ok(outcome)
    }

    /// Apply a snapshot refresh result.
    ///
    /// A successful refresh is forwarded to the event's `reply_to` address, if
    /// any, after it has been persisted.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidEvent` for a malformed event,
    /// `ControlError::SnapshotNotFound` for an unknown snapshot and
    /// `ControlError::Bus` if the completion notice cannot be published.
    pub async fn apply_snapshot_updated(&self, event: &Event, now: DateTime<Utc>) -> Result<EventOutcome> {
        let parsed: SnapshotEvent = decode(event)?;
        let snapshot_id = parsed.snapshot_id;
        let result = into_result(parsed.error, parsed.data);
        let next = lifecycle::snapshot::on_update_result(result.is_ok());

        let snapshot = self
            .store
            .update_snapshot(&snapshot_id, |snapshot| {
                snapshot.update_status = Some(next);
                if let Ok(Some(ids)) = &result {
                    apply_cloud_ids(snapshot, ids);
                }
                record_failure(
                    &mut snapshot.update_message,
                    &mut snapshot.update_detail,
                    result.as_ref().err(),
                );
                snapshot.update_processed_at = Some(now);
                Ok(snapshot.clone())
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::SnapshotNotFound(snapshot_id)))?;

        let outcome = EventOutcome::applied(snapshot_id, next.as_str());
        log_outcome(event, &outcome);

        if result.is_ok() {
            if let Some(reply_to) = &event.reply_to {
                self.bus
                    .send_command(commands::update_completed(reply_to, &snapshot))
                    .await?;
                debug!(snapshot_id = %snapshot_id, reply_to = %reply_to, "Forwarded update completion");
            }
        }

        Ok(outcome)
    }

    // =========================================================================
    // Node events
    // =========================================================================

    /// Apply a node create result.
    ///
    /// Provisioning artifacts in the event are kept whether the creation
    /// succeeded or not, so a later retry can resume from them.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidEvent` for a malformed event and
    /// `ControlError::NodeNotFound` for an unknown node.
    pub fn apply_node_created(&self, event: &Event, now: DateTime<Utc>) -> Result<EventOutcome> {
        let parsed: NodeEvent = decode(event)?;
        let node_id = parsed.node_id;
        let error = parsed.error;
        let artifacts = parsed.data.unwrap_or_default();

        let outcome = self
            .store
            .update_node(&node_id, |node| {
                if artifacts.volume.is_some() {
                    node.volume.clone_from(&artifacts.volume);
                }
                if artifacts.droplet.is_some() {
                    node.droplet.clone_from(&artifacts.droplet);
                }
                if artifacts.fullnode_info.is_some() {
                    node.fullnode_info.clone_from(&artifacts.fullnode_info);
                }
                if artifacts.process.is_some() {
                    node.create_process.clone_from(&artifacts.process);
                }

                let next = lifecycle::node::on_create_result(error.is_none());
                node.status = next;
                record_failure(&mut node.message, &mut node.detail, error.as_ref());
                node.create_processed_at = Some(now);
                Ok(EventOutcome::applied(node_id, next.as_str()))
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::NodeNotFound(node_id)))?;

        log_outcome(event, &outcome);
        Ok(outcome)
    }

    /// Apply a node delete result, releasing the node's project slot on success.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidEvent` for a malformed event and
    /// `ControlError::NodeNotFound` for an unknown node.
    pub fn apply_node_deleted(&self, event: &Event, now: DateTime<Utc>) -> Result<EventOutcome> {
        let parsed: NodeEvent = decode(event)?;
        let node_id = parsed.node_id;
        let error = parsed.error;

        let (outcome, released): (EventOutcome, Option<ProjectId>) = self
            .store
            .update_node(&node_id, |node| {
                let Some(next) = lifecycle::node::on_delete_result(node.status, error.is_none()) else {
                    return Ok((EventOutcome::ignored(node_id, node.status.as_str()), None));
                };

                node.status = next;
                record_failure(&mut node.message, &mut node.detail, error.as_ref());
                node.delete_processed_at = Some(now);
                let released = if error.is_none() { node.project_id } else { None };
                Ok((EventOutcome::applied(node_id, next.as_str()), released))
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::NodeNotFound(node_id)))?;

        if let Some(project_id) = released {
            self.release_project_slot(&project_id)?;
        }

        log_outcome(event, &outcome);
        Ok(outcome)
    }

    pub(crate) fn release_project_slot(&self, project_id: &ProjectId) -> Result<()> {
        let released = self.store.update_project(project_id, |project| {
            project.node_count = project.node_count.saturating_sub(1);
            Ok::<_, ControlError>(project.node_count)
        });

        match released {
            Ok(node_count) => {
                debug!(project_id = %project_id, node_count, "Released project node slot");
                Ok(())
            }
            Err(ControlError::Store(StoreError::NotFound)) => {
                warn!(project_id = %project_id, "Deleted node references a missing project");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a monitoring registration result.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidEvent` for a malformed event and
    /// `ControlError::NodeNotFound` for an unknown node.
    pub fn apply_monitoring_registered(&self, event: &Event, now: DateTime<Utc>) -> Result<EventOutcome> {
        let parsed: NodeEvent = decode(event)?;
        let node_id = parsed.node_id;
        let error = parsed.error;
        let status = lifecycle::node::on_monitoring_result(error.is_none());

        self.store
            .update_node(&node_id, |node| {
                let mut monitoring = Monitoring {
                    status,
                    message: None,
                    detail: None,
                    processed_at: Some(now),
                };
                record_failure(&mut monitoring.message, &mut monitoring.detail, error.as_ref());
                node.monitoring = Some(monitoring);
                Ok::<_, ControlError>(())
            })
            .map_err(|e| e.or_not_found(|| ControlError::NodeNotFound(node_id)))?;

        let outcome = EventOutcome::applied(node_id, status.as_str());
        log_outcome(event, &outcome);
        Ok(outcome)
    }
}

/// Bus handler for one kind of driver event.
pub struct DriverEventHandler<S: Store, B: CommandBus> {
    service: Arc<ControlPlaneService<S, B>>,
    kind: DriverEvent,
}

impl<S: Store, B: CommandBus> DriverEventHandler<S, B> {
    /// Create a handler applying `kind` events through `service`.
    #[must_use]
    pub const fn new(service: Arc<ControlPlaneService<S, B>>, kind: DriverEvent) -> Self {
        Self { service, kind }
    }
}

#[async_trait]
impl<S, B> EventHandler for DriverEventHandler<S, B>
where
    S: Store + 'static,
    B: CommandBus + 'static,
{
    type Outcome = EventOutcome;
    type Error = ControlError;

    async fn handle(&self, event: &Event) -> Result<EventOutcome> {
        let now = Utc::now();
        match self.kind {
            DriverEvent::SnapshotCreated => self.service.apply_snapshot_created(event, now),
            DriverEvent::SnapshotDeleted => self.service.apply_snapshot_deleted(event, now),
            DriverEvent::SnapshotUpdated => self.service.apply_snapshot_updated(event, now).await,
            DriverEvent::NodeCreated => self.service.apply_node_created(event, now),
            DriverEvent::NodeDeleted => self.service.apply_node_deleted(event, now),
            DriverEvent::MonitoringRegistered => self.service.apply_monitoring_registered(event, now),
        }
    }
}

/// Build a router with a handler for every reply topic.
#[must_use]
pub fn event_router<S, B>(service: &Arc<ControlPlaneService<S, B>>) -> EventRouter<EventOutcome, ControlError>
where
    S: Store + 'static,
    B: CommandBus + 'static,
{
    DriverEvent::ALL
        .into_iter()
        .fold(EventRouter::new(), |router, kind| {
            router.route(
                kind.topic(),
                Arc::new(DriverEventHandler::new(Arc::clone(service), kind)),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::EVENT_INBOX;
    use crate::service::ControlPlane;
    use crate::testing::Harness;
    use crate::types::{CreateNodeRequest, CreateProjectRequest, CreateSnapshotRequest};
    use serde_json::json;
    use valinfra_core::{NodeId, Requester, SnapshotId, UserId};
    use valinfra_store::{MonitoringStatus, Node, NodeStatus, SnapshotStatus, UpdateStatus};

    fn alice() -> Requester {
        Requester::user(UserId::from_bytes([1u8; 32]))
    }

    fn event(topic: &str, body: Value) -> Event {
        Event {
            routing_key: topic.to_string(),
            body,
            reply_to: None,
            message_id: None,
        }
    }

    fn created_ok(snapshot_id: SnapshotId, cloud_id: &str) -> Event {
        event(
            topics::SNAPSHOT_CREATED,
            json!({
                "snapshot_id": snapshot_id,
                "data": {"snapshot_cloud_id": cloud_id, "droplet_cloud_id": "drop-1"},
            }),
        )
    }

    async fn pending_snapshot(h: &Harness) -> Snapshot {
        h.service
            .create_snapshot(&alice(), CreateSnapshotRequest::new("s", "cosmoshub-4", "vol-1"))
            .await
            .unwrap()
    }

    async fn pending_node(h: &Harness, project: bool) -> Node {
        let snapshot = h.created_snapshot(&alice(), "base").await;
        let mut request = CreateNodeRequest::new("n", snapshot.snapshot_id, "ams3");
        if project {
            let project = h
                .service
                .create_project(&alice(), CreateProjectRequest { name: "p".to_string() })
                .await
                .unwrap();
            request = request.in_project(project.project_id);
        }
        h.service.create_node(&alice(), request).await.unwrap()
    }

    fn force_node_status(h: &Harness, node_id: &NodeId, status: NodeStatus) {
        h.store
            .update_node(node_id, |n| {
                n.status = status;
                Ok::<_, ControlError>(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn create_success_round_trip() {
        let h = Harness::new();
        let snapshot = pending_snapshot(&h).await;

        let outcome = h
            .service
            .apply_snapshot_created(&created_ok(snapshot.snapshot_id, "snap-77"), Utc::now())
            .unwrap();
        assert!(outcome.is_applied());

        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.status, SnapshotStatus::Created);
        assert_eq!(stored.snapshot_cloud_id.as_deref(), Some("snap-77"));
        assert_eq!(stored.droplet_cloud_id.as_deref(), Some("drop-1"));
        assert_eq!(stored.volume_cloud_id, "vol-1");
        assert!(stored.create_processed_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_create_event_is_idempotent() {
        let h = Harness::new();
        let snapshot = pending_snapshot(&h).await;
        let ok = created_ok(snapshot.snapshot_id, "snap-1");

        h.service.apply_snapshot_created(&ok, Utc::now()).unwrap();
        let once = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();

        let outcome = h.service.apply_snapshot_created(&ok, Utc::now()).unwrap();
        assert!(!outcome.is_applied());
        let twice = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn stale_create_event_leaves_document_unchanged() {
        let h = Harness::new();
        let snapshot = pending_snapshot(&h).await;
        h.store
            .update_snapshot(&snapshot.snapshot_id, |s| {
                s.status = SnapshotStatus::Deleted;
                Ok::<_, ControlError>(())
            })
            .unwrap();
        let before = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();

        let outcome = h
            .service
            .apply_snapshot_created(&created_ok(snapshot.snapshot_id, "snap-1"), Utc::now())
            .unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Ignored {
                resource_id: snapshot.snapshot_id.to_hex(),
                status: "DELETED",
            }
        );
        assert_eq!(h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn failed_create_records_error_and_a_late_success_still_lands() {
        let h = Harness::new();
        let snapshot = pending_snapshot(&h).await;

        h.service
            .apply_snapshot_created(
                &event(
                    topics::SNAPSHOT_CREATED,
                    json!({
                        "snapshot_id": snapshot.snapshot_id,
                        "error": {"message": "volume busy", "detail": {"retry_after": 30}},
                    }),
                ),
                Utc::now(),
            )
            .unwrap();
        let failed = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(failed.status, SnapshotStatus::CreateFail);
        assert_eq!(failed.message.as_deref(), Some("volume busy"));
        assert_eq!(failed.detail, Some(json!({"retry_after": 30})));

        h.service
            .apply_snapshot_created(&created_ok(snapshot.snapshot_id, "snap-2"), Utc::now())
            .unwrap();
        let created = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(created.status, SnapshotStatus::Created);
        assert!(created.message.is_none());
    }

    #[tokio::test]
    async fn success_without_cloud_id_is_invalid() {
        let h = Harness::new();
        let snapshot = pending_snapshot(&h).await;

        let err = h
            .service
            .apply_snapshot_created(
                &event(
                    topics::SNAPSHOT_CREATED,
                    json!({"snapshot_id": snapshot.snapshot_id, "data": {}}),
                ),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidEvent(_)));

        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.status, SnapshotStatus::CreatePending);
    }

    #[tokio::test]
    async fn unknown_snapshot_is_reported() {
        let h = Harness::new();
        let err = h
            .service
            .apply_snapshot_deleted(
                &event(
                    topics::SNAPSHOT_DELETED,
                    json!({"snapshot_id": SnapshotId::from_bytes([7u8; 32])}),
                ),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ControlError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn delete_events_resolve_pending_and_failed_deletes() {
        let h = Harness::new();
        let snapshot = h.created_snapshot(&alice(), "s").await;
        h.service.delete_snapshot(&alice(), &snapshot.snapshot_id).await.unwrap();

        let failure = event(
            topics::SNAPSHOT_DELETED,
            json!({"snapshot_id": snapshot.snapshot_id, "error": {"message": "in use"}}),
        );
        h.service.apply_snapshot_deleted(&failure, Utc::now()).unwrap();
        assert_eq!(
            h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap().status,
            SnapshotStatus::DeleteFail
        );

        let success = event(topics::SNAPSHOT_DELETED, json!({"snapshot_id": snapshot.snapshot_id}));
        h.service.apply_snapshot_deleted(&success, Utc::now()).unwrap();
        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.status, SnapshotStatus::Deleted);
        assert!(stored.delete_processed_at.is_some());

        let late_create = h
            .service
            .apply_snapshot_created(&created_ok(snapshot.snapshot_id, "snap-x"), Utc::now())
            .unwrap();
        assert!(!late_create.is_applied());
    }

    #[tokio::test]
    async fn update_success_is_persisted_then_forwarded() {
        let h = Harness::new();
        let snapshot = h.created_snapshot(&alice(), "s").await;
        h.service.update_snapshot(&alice(), &snapshot.snapshot_id).await.unwrap();

        let mut updated = event(
            topics::SNAPSHOT_UPDATED,
            json!({"snapshot_id": snapshot.snapshot_id, "data": {"snapshot_cloud_id": "snap-new"}}),
        );
        updated.reply_to = Some("nodeservice.snapshot_ready".to_string());

        h.service.apply_snapshot_updated(&updated, Utc::now()).await.unwrap();

        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.update_status, Some(UpdateStatus::Updated));
        assert_eq!(stored.snapshot_cloud_id.as_deref(), Some("snap-new"));
        assert!(stored.update_processed_at.is_some());

        let forwarded = h.bus.sent_to("nodeservice.snapshot_ready");
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].payload["update_status"], "UPDATED");
        assert_eq!(forwarded[0].payload["data"]["snapshot_cloud_id"], "snap-new");
    }

    #[tokio::test]
    async fn update_failure_is_recorded_without_forwarding() {
        let h = Harness::new();
        let snapshot = h.created_snapshot(&alice(), "s").await;

        let mut failed = event(
            topics::SNAPSHOT_UPDATED,
            json!({"snapshot_id": snapshot.snapshot_id, "error": {"message": "sync stalled"}}),
        );
        failed.reply_to = Some("nodeservice.snapshot_ready".to_string());
        h.bus.take_sent();

        let outcome = h.service.apply_snapshot_updated(&failed, Utc::now()).await.unwrap();
        assert!(outcome.is_applied());

        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.update_status, Some(UpdateStatus::UpdateFail));
        assert_eq!(stored.update_message.as_deref(), Some("sync stalled"));
        assert!(stored.message.is_none());
        assert!(h.bus.sent().is_empty());
    }

    #[tokio::test]
    async fn late_update_success_keeps_the_delete_failure_reason() {
        let h = Harness::new();
        let snapshot = h.created_snapshot(&alice(), "s").await;
        h.store
            .update_snapshot(&snapshot.snapshot_id, |s| {
                s.status = SnapshotStatus::DeleteFail;
                s.message = Some("volume in use".to_string());
                s.update_status = Some(UpdateStatus::UpdatePending);
                Ok::<_, ControlError>(())
            })
            .unwrap();

        let updated = event(
            topics::SNAPSHOT_UPDATED,
            json!({"snapshot_id": snapshot.snapshot_id, "data": {"snapshot_cloud_id": "snap-new"}}),
        );
        h.service.apply_snapshot_updated(&updated, Utc::now()).await.unwrap();

        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.status, SnapshotStatus::DeleteFail);
        assert_eq!(stored.update_status, Some(UpdateStatus::Updated));
        assert_eq!(stored.message.as_deref(), Some("volume in use"));
        assert!(stored.update_message.is_none());
    }

    #[tokio::test]
    async fn node_create_failure_keeps_artifacts_for_resume() {
        let h = Harness::new();
        let node = pending_node(&h, false).await;

        h.service
            .apply_node_created(
                &event(
                    topics::NODE_CREATED,
                    json!({
                        "node_id": node.node_id,
                        "error": {"message": "droplet unreachable"},
                        "data": {"volume": {"id": "vol-9"}, "process": {"step": "attach_volume"}},
                    }),
                ),
                Utc::now(),
            )
            .unwrap();

        let stored = h.store.get_node(&node.node_id).unwrap().unwrap();
        assert_eq!(stored.status, NodeStatus::CreateFail);
        assert_eq!(stored.volume, Some(json!({"id": "vol-9"})));
        assert_eq!(stored.create_process, Some(json!({"step": "attach_volume"})));

        h.service.retry_node(&alice(), &node.node_id).await.unwrap();
        h.service
            .apply_node_created(
                &event(
                    topics::NODE_CREATED,
                    json!({
                        "node_id": node.node_id,
                        "data": {"fullnode_info": {"rpc": "http://10.0.0.5:26657"}},
                    }),
                ),
                Utc::now(),
            )
            .unwrap();

        let stored = h.store.get_node(&node.node_id).unwrap().unwrap();
        assert_eq!(stored.status, NodeStatus::Created);
        assert_eq!(stored.volume, Some(json!({"id": "vol-9"})));
        assert!(stored.fullnode_info.is_some());
        assert!(stored.message.is_none());
    }

    #[tokio::test]
    async fn node_delete_releases_project_once() {
        let h = Harness::new();
        let node = pending_node(&h, true).await;
        let project_id = node.project_id.unwrap();
        force_node_status(&h, &node.node_id, NodeStatus::Created);
        h.service.delete_node(&alice(), &node.node_id).await.unwrap();

        let deleted = event(topics::NODE_DELETED, json!({"node_id": node.node_id}));
        assert!(h.service.apply_node_deleted(&deleted, Utc::now()).unwrap().is_applied());
        assert!(!h.service.apply_node_deleted(&deleted, Utc::now()).unwrap().is_applied());

        let project = h.store.get_project(&project_id).unwrap().unwrap();
        assert_eq!(project.node_count, 0);
        h.service.delete_project(&alice(), &project_id).await.unwrap();
    }

    #[tokio::test]
    async fn failed_node_delete_keeps_project_slot() {
        let h = Harness::new();
        let node = pending_node(&h, true).await;
        force_node_status(&h, &node.node_id, NodeStatus::DeletePending);

        h.service
            .apply_node_deleted(
                &event(
                    topics::NODE_DELETED,
                    json!({"node_id": node.node_id, "error": {"message": "volume attached"}}),
                ),
                Utc::now(),
            )
            .unwrap();

        let stored = h.store.get_node(&node.node_id).unwrap().unwrap();
        assert_eq!(stored.status, NodeStatus::DeleteFail);
        let project = h.store.get_project(&node.project_id.unwrap()).unwrap().unwrap();
        assert_eq!(project.node_count, 1);
    }

    #[tokio::test]
    async fn monitoring_result_is_recorded_independently() {
        let h = Harness::new();
        let node = pending_node(&h, false).await;

        h.service
            .apply_monitoring_registered(
                &event(
                    topics::MONITORING_REGISTERED,
                    json!({"node_id": node.node_id, "error": {"message": "unknown validator"}}),
                ),
                Utc::now(),
            )
            .unwrap();

        let stored = h.store.get_node(&node.node_id).unwrap().unwrap();
        assert_eq!(stored.status, NodeStatus::CreatePending);
        let monitoring = stored.monitoring.unwrap();
        assert_eq!(monitoring.status, MonitoringStatus::RegisterFail);
        assert_eq!(monitoring.message.as_deref(), Some("unknown validator"));
    }

    #[tokio::test]
    async fn router_applies_events_from_the_inbox() {
        let h = Harness::new();
        let snapshot = pending_snapshot(&h).await;
        let service = Arc::new(ControlPlaneService::with_defaults(
            Arc::clone(&h.store),
            Arc::clone(&h.bus),
        ));
        let router = event_router(&service);
        assert_eq!(router.routing_keys().len(), topics::ALL.len());

        let inbox = h.bus.subscribe(EVENT_INBOX, &router.routing_keys()).await.unwrap();
        h.bus.publish_raw(topics::SNAPSHOT_CREATED, b"not json".to_vec());
        h.bus.publish_event(
            topics::SNAPSHOT_CREATED,
            &json!({"snapshot_id": snapshot.snapshot_id, "data": {"snapshot_cloud_id": "snap-r"}}),
            None,
        );
        h.bus.publish_event(
            topics::SNAPSHOT_CREATED,
            &json!({"snapshot_id": snapshot.snapshot_id, "data": {"snapshot_cloud_id": "snap-r"}}),
            None,
        );
        h.bus.publish_event(topics::NODE_DELETED, &json!({"node_id": "zz"}), None);
        h.bus.close().await.unwrap();

        let stats = router.run(inbox, std::future::pending::<()>()).await;
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.undecodable, 1);
        assert_eq!(h.bus.ack_count(), 4);

        let stored = h.store.get_snapshot(&snapshot.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.status, SnapshotStatus::Created);
        assert_eq!(stored.snapshot_cloud_id.as_deref(), Some("snap-r"));
    }
}
