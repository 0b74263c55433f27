//! Lifecycle service implementation.
//!
//! This module provides the `ControlPlane` trait and `ControlPlaneService`
//! implementation that validates lifecycle requests, persists the resulting
//! pending state and emits the matching driver command.
//!
//! Every mutating request follows the same order: validate, commit the new
//! status through an atomic store update, then publish the command. A command
//! is therefore never sent for a transition that was not persisted.
//!
//! A command the broker refuses never reaches a driver, so no result event
//! will follow. The pending status is then resolved to its failed
//! counterpart (`CREATE_FAIL`, `DELETE_FAIL`, `UPDATE_FAIL`, `REGISTER_FAIL`)
//! before the bus error is returned, leaving the resource open to retry or
//! deletion.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};
use valinfra_bus::{Command, CommandBus};
use valinfra_core::{MonitorId, NodeId, ProjectId, Requester, SnapshotId, UserId};
use valinfra_store::{
    Monitoring, MonitoringStatus, NetworkSetupConfig, Node, NodeStatus, Project, ProjectStatus,
    Snapshot, SnapshotStatus, Store, UpdateStatus, Validator, ValidatorMonitor,
};

use crate::chain_client::{ChainClient, HttpChainClient, ValidatorInfo};
use crate::commands;
use crate::error::{ControlError, Result};
use crate::lifecycle::{self, Rejection};
use crate::schedule::CronSchedule;
use crate::types::{
    ControlConfig, CreateNodeRequest, CreateProjectRequest, CreateSnapshotRequest, Listing,
    NetworkSummary, Page,
};

/// Trait defining the lifecycle operations.
///
/// Every operation takes the authenticated [`Requester`]; only the owner of a
/// resource or an admin may view or mutate it.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // Projects
    // =========================================================================

    /// Create a project owned by the requester.
    async fn create_project(&self, requester: &Requester, request: CreateProjectRequest) -> Result<Project>;

    /// Get a project.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ProjectNotFound` or `ControlError::NotOwner`.
    async fn get_project(&self, requester: &Requester, project_id: &ProjectId) -> Result<Project>;

    /// List the requester's projects (every project for admins), newest first.
    async fn list_projects(&self, requester: &Requester) -> Result<Vec<Project>>;

    /// Delete a project.
    ///
    /// # Errors
    ///
    /// Rejected while the project still owns nodes or once it is deleted.
    async fn delete_project(&self, requester: &Requester, project_id: &ProjectId) -> Result<Project>;

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Create a snapshot and ask the driver to take it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NetworkNotFound` for an unknown network and
    /// `ControlError::InvalidSchedule` for a bad cron expression.
    async fn create_snapshot(&self, requester: &Requester, request: CreateSnapshotRequest) -> Result<Snapshot>;

    /// Get a snapshot.
    async fn get_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot>;

    /// List snapshots, newest first.
    async fn list_snapshots(&self, requester: &Requester, page: Page) -> Result<Listing<Snapshot>>;

    /// Ask the driver to delete a snapshot.
    ///
    /// # Errors
    ///
    /// Rejected while a create, delete or refresh is in flight, or once deleted.
    async fn delete_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot>;

    /// Ask the driver to refresh a snapshot now.
    ///
    /// # Errors
    ///
    /// Rejected unless the snapshot is `CREATED` with no refresh in flight.
    async fn update_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot>;

    /// Set or clear the refresh schedule of a snapshot.
    async fn set_snapshot_schedule(
        &self,
        requester: &Requester,
        snapshot_id: &SnapshotId,
        cron_time: Option<String>,
    ) -> Result<Snapshot>;

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Create a node from a snapshot and ask the driver to provision it.
    ///
    /// # Errors
    ///
    /// Rejected with `Rejection::SnapshotNotCreated` unless the snapshot is
    /// `CREATED`; the referenced project must exist and belong to the requester.
    async fn create_node(&self, requester: &Requester, request: CreateNodeRequest) -> Result<Node>;

    /// Get a node.
    async fn get_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node>;

    /// List the requester's nodes (every node for admins), newest first.
    async fn list_nodes(&self, requester: &Requester, page: Page) -> Result<Listing<Node>>;

    /// Retry a failed node creation, resuming from recorded progress when there is any.
    async fn retry_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node>;

    /// Ask the driver to tear down a node.
    async fn delete_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node>;

    /// Attach a validator to a created node and register it with monitoring.
    async fn attach_validator(&self, requester: &Requester, node_id: &NodeId, validator: Validator) -> Result<Node>;

    /// Query the chain for the staking state of a node's validator.
    async fn get_validator_info(&self, requester: &Requester, node_id: &NodeId) -> Result<ValidatorInfo>;

    // =========================================================================
    // Networks
    // =========================================================================

    /// List the networks resources can be created on.
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>>;
}

/// The main lifecycle service implementation.
pub struct ControlPlaneService<S: Store, B: CommandBus> {
    pub(crate) store: Arc<S>,
    pub(crate) bus: Arc<B>,
    chain: Arc<dyn ChainClient>,
    config: ControlConfig,
}

impl<S: Store, B: CommandBus> ControlPlaneService<S, B> {
    /// Create a new lifecycle service.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<B>, config: ControlConfig) -> Self {
        let chain = Arc::new(HttpChainClient::new(config.chain_timeout));
        Self {
            store,
            bus,
            chain,
            config,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>, bus: Arc<B>) -> Self {
        Self::new(store, bus, ControlConfig::default())
    }

    /// Replace the chain client.
    #[must_use]
    pub fn with_chain_client(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = chain;
        self
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Verify that the requester may access a resource owned by `owner`.
    fn verify_access(requester: &Requester, owner: &UserId, resource: impl FnOnce() -> String) -> Result<()> {
        if requester.can_access(owner) {
            Ok(())
        } else {
            Err(ControlError::NotOwner {
                user_id: requester.user_id,
                resource: resource(),
            })
        }
    }

    fn load_project(&self, requester: &Requester, project_id: &ProjectId) -> Result<Project> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or(ControlError::ProjectNotFound(*project_id))?;
        Self::verify_access(requester, &project.user_id, || format!("project {project_id}"))?;
        Ok(project)
    }

    fn load_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot> {
        let snapshot = self
            .store
            .get_snapshot(snapshot_id)?
            .ok_or(ControlError::SnapshotNotFound(*snapshot_id))?;
        Self::verify_access(requester, &snapshot.user_id, || format!("snapshot {snapshot_id}"))?;
        Ok(snapshot)
    }

    fn load_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node> {
        let node = self
            .store
            .get_node(node_id)?
            .ok_or(ControlError::NodeNotFound(*node_id))?;
        Self::verify_access(requester, &node.user_id, || format!("node {node_id}"))?;
        Ok(node)
    }

    fn network_config(&self, network: &str) -> Result<NetworkSetupConfig> {
        self.store
            .get_network_config(network)?
            .ok_or_else(|| ControlError::NetworkNotFound(network.to_string()))
    }

    /// Atomically transition a snapshot the requester may access.
    fn transition_snapshot<F>(&self, requester: &Requester, snapshot_id: &SnapshotId, f: F) -> Result<Snapshot>
    where
        F: FnOnce(&mut Snapshot) -> std::result::Result<(), Rejection>,
    {
        self.store
            .update_snapshot(snapshot_id, |snapshot| {
                Self::verify_access(requester, &snapshot.user_id, || format!("snapshot {snapshot_id}"))?;
                f(snapshot).map_err(|reason| ControlError::rejected(format!("snapshot {snapshot_id}"), reason))?;
                Ok(snapshot.clone())
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::SnapshotNotFound(*snapshot_id)))
    }

    /// Atomically transition a node the requester may access.
    fn transition_node<F>(&self, requester: &Requester, node_id: &NodeId, f: F) -> Result<Node>
    where
        F: FnOnce(&mut Node) -> std::result::Result<(), Rejection>,
    {
        self.store
            .update_node(node_id, |node| {
                Self::verify_access(requester, &node.user_id, || format!("node {node_id}"))?;
                f(node).map_err(|reason| ControlError::rejected(format!("node {node_id}"), reason))?;
                Ok(node.clone())
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::NodeNotFound(*node_id)))
    }

    /// Atomically transition a project the requester may access.
    fn transition_project<F>(&self, requester: &Requester, project_id: &ProjectId, f: F) -> Result<Project>
    where
        F: FnOnce(&mut Project) -> std::result::Result<(), Rejection>,
    {
        self.store
            .update_project(project_id, |project| {
                Self::verify_access(requester, &project.user_id, || format!("project {project_id}"))?;
                f(project).map_err(|reason| ControlError::rejected(format!("project {project_id}"), reason))?;
                Ok(project.clone())
            })
            .map_err(|e: ControlError| e.or_not_found(|| ControlError::ProjectNotFound(*project_id)))
    }

    /// Build the create command for a node, from scratch or resuming recorded progress.
    fn provisioning_command(&self, node: &Node) -> Result<Command> {
        if node.create_process.is_some() {
            return Ok(commands::resume_create_node(node));
        }

        let snapshot = self
            .store
            .get_snapshot(&node.snapshot_id)?
            .ok_or(ControlError::SnapshotNotFound(node.snapshot_id))?;
        let snapshot_cloud_id = snapshot
            .snapshot_cloud_id
            .filter(|_| lifecycle::snapshot::is_usable(snapshot.status))
            .ok_or_else(|| {
                ControlError::rejected(format!("snapshot {}", node.snapshot_id), Rejection::SnapshotNotCreated)
            })?;
        let config = self.network_config(&node.network)?;

        Ok(commands::create_node(node, &snapshot_cloud_id, &config))
    }

    /// Publish `command`. If the broker refuses it, `record` moves the resource
    /// out of its pending status before the bus error is returned.
    async fn publish<F>(&self, command: Command, resource: String, record: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<()> + Send,
    {
        let routing_key = command.routing_key.clone();
        let Err(e) = self.bus.send_command(command).await else {
            return Ok(());
        };

        error!(
            resource = %resource,
            routing_key = %routing_key,
            error = %e,
            "Failed to publish command"
        );
        if let Err(record_error) = record(&e.to_string()) {
            error!(resource = %resource, error = %record_error, "Failed to record publish failure");
        }
        Err(e.into())
    }

    fn fail_snapshot(
        &self,
        snapshot_id: &SnapshotId,
        pending: SnapshotStatus,
        failed: SnapshotStatus,
        reason: &str,
    ) -> Result<()> {
        self.store.update_snapshot(snapshot_id, |snapshot| {
            if snapshot.status == pending {
                snapshot.status = failed;
                snapshot.message = Some(reason.to_string());
                snapshot.detail = None;
            }
            Ok(())
        })
    }

    fn fail_snapshot_update(&self, snapshot_id: &SnapshotId, reason: &str) -> Result<()> {
        self.store.update_snapshot(snapshot_id, |snapshot| {
            if snapshot.is_update_pending() {
                snapshot.update_status = Some(UpdateStatus::UpdateFail);
                snapshot.update_message = Some(reason.to_string());
                snapshot.update_detail = None;
            }
            Ok(())
        })
    }

    fn fail_node(
        &self,
        node_id: &NodeId,
        pending: &[NodeStatus],
        failed: NodeStatus,
        reason: &str,
    ) -> Result<()> {
        self.store.update_node(node_id, |node| {
            if pending.contains(&node.status) {
                node.status = failed;
                node.message = Some(reason.to_string());
                node.detail = None;
            }
            Ok(())
        })
    }

    fn fail_monitoring(&self, node_id: &NodeId, reason: &str) -> Result<()> {
        self.store.update_node(node_id, |node| {
            if let Some(monitoring) = node
                .monitoring
                .as_mut()
                .filter(|m| m.status == MonitoringStatus::RegisterPending)
            {
                monitoring.status = MonitoringStatus::RegisterFail;
                monitoring.message = Some(reason.to_string());
                monitoring.detail = None;
            }
            Ok(())
        })
    }
}

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ControlError::InvalidRequest(format!("{what} name must not be empty")));
    }
    Ok(())
}

#[async_trait]
impl<S, B> ControlPlane for ControlPlaneService<S, B>
where
    S: Store + 'static,
    B: CommandBus + 'static,
{
    // =========================================================================
    // Projects
    // =========================================================================

    async fn create_project(&self, requester: &Requester, request: CreateProjectRequest) -> Result<Project> {
        require_name(&request.name, "project")?;

        let now = Utc::now();
        let project = Project {
            project_id: ProjectId::generate(&requester.user_id, &request.name),
            user_id: requester.user_id,
            name: request.name,
            status: ProjectStatus::Created,
            node_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.put_project(&project)?;

        info!(project_id = %project.project_id, user_id = %project.user_id, "Created project");
        Ok(project)
    }

    async fn get_project(&self, requester: &Requester, project_id: &ProjectId) -> Result<Project> {
        self.load_project(requester, project_id)
    }

    async fn list_projects(&self, requester: &Requester) -> Result<Vec<Project>> {
        let mut projects = if requester.is_admin() {
            self.store.list_all_projects()?
        } else {
            self.store.list_projects_by_user(&requester.user_id)?
        };
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn delete_project(&self, requester: &Requester, project_id: &ProjectId) -> Result<Project> {
        let project = self.transition_project(requester, project_id, |project| {
            project.status = lifecycle::project::request_delete(project.status, project.node_count)?;
            Ok(())
        })?;

        info!(project_id = %project_id, "Deleted project");
        Ok(project)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    async fn create_snapshot(&self, requester: &Requester, request: CreateSnapshotRequest) -> Result<Snapshot> {
        require_name(&request.name, "snapshot")?;
        if let Some(cron_time) = &request.cron_time {
            CronSchedule::parse(cron_time)?;
        }
        self.network_config(&request.network)?;

        let now = Utc::now();
        let snapshot = Snapshot {
            snapshot_id: SnapshotId::generate(&requester.user_id, &request.name),
            user_id: requester.user_id,
            name: request.name,
            network: request.network,
            status: SnapshotStatus::CreatePending,
            update_status: None,
            volume_cloud_id: request.volume_cloud_id,
            snapshot_cloud_id: None,
            droplet_cloud_id: None,
            tags: request.tags,
            cron_time: request.cron_time,
            message: None,
            detail: None,
            update_message: None,
            update_detail: None,
            created_at: now,
            updated_at: now,
            create_processed_at: None,
            delete_processed_at: None,
            update_processed_at: None,
        };

        self.store.put_snapshot(&snapshot)?;
        let snapshot_id = snapshot.snapshot_id;
        self.publish(commands::create_snapshot(&snapshot), format!("snapshot {snapshot_id}"), |reason| {
            self.fail_snapshot(&snapshot_id, SnapshotStatus::CreatePending, SnapshotStatus::CreateFail, reason)
        })
        .await?;

        info!(
            snapshot_id = %snapshot.snapshot_id,
            network = %snapshot.network,
            user_id = %snapshot.user_id,
            "Requested snapshot creation"
        );
        Ok(snapshot)
    }

    async fn get_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot> {
        self.load_snapshot(requester, snapshot_id)
    }

    async fn list_snapshots(&self, _requester: &Requester, page: Page) -> Result<Listing<Snapshot>> {
        let mut snapshots = self.store.list_all_snapshots()?;
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(snapshots, &self.config))
    }

    async fn delete_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot> {
        let snapshot = self.transition_snapshot(requester, snapshot_id, |snapshot| {
            snapshot.status = lifecycle::snapshot::request_delete(snapshot.status, snapshot.update_status)?;
            Ok(())
        })?;

        self.publish(commands::delete_snapshot(&snapshot), format!("snapshot {snapshot_id}"), |reason| {
            self.fail_snapshot(snapshot_id, SnapshotStatus::DeletePending, SnapshotStatus::DeleteFail, reason)
        })
        .await?;

        info!(snapshot_id = %snapshot_id, "Requested snapshot deletion");
        Ok(snapshot)
    }

    async fn update_snapshot(&self, requester: &Requester, snapshot_id: &SnapshotId) -> Result<Snapshot> {
        let current = self.load_snapshot(requester, snapshot_id)?;
        let config = self.network_config(&current.network)?;

        let snapshot = self.transition_snapshot(requester, snapshot_id, |snapshot| {
            let next = lifecycle::snapshot::request_update(snapshot.status, snapshot.update_status)?;
            snapshot.update_status = Some(next);
            Ok(())
        })?;

        self.publish(
            commands::update_snapshot(&snapshot, &config),
            format!("snapshot {snapshot_id}"),
            |reason| self.fail_snapshot_update(snapshot_id, reason),
        )
        .await?;

        info!(snapshot_id = %snapshot_id, "Requested snapshot update");
        Ok(snapshot)
    }

    async fn set_snapshot_schedule(
        &self,
        requester: &Requester,
        snapshot_id: &SnapshotId,
        cron_time: Option<String>,
    ) -> Result<Snapshot> {
        if let Some(expression) = &cron_time {
            CronSchedule::parse(expression)?;
        }

        let snapshot = self.transition_snapshot(requester, snapshot_id, |snapshot| {
            if snapshot.status == SnapshotStatus::Deleted {
                return Err(Rejection::AlreadyDeleted);
            }
            snapshot.cron_time = cron_time;
            Ok(())
        })?;

        info!(snapshot_id = %snapshot_id, cron_time = ?snapshot.cron_time, "Updated snapshot schedule");
        Ok(snapshot)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    async fn create_node(&self, requester: &Requester, request: CreateNodeRequest) -> Result<Node> {
        require_name(&request.name, "node")?;

        let snapshot = self
            .store
            .get_snapshot(&request.snapshot_id)?
            .ok_or(ControlError::SnapshotNotFound(request.snapshot_id))?;
        let snapshot_cloud_id = snapshot
            .snapshot_cloud_id
            .clone()
            .filter(|_| lifecycle::snapshot::is_usable(snapshot.status))
            .ok_or_else(|| {
                ControlError::rejected(format!("snapshot {}", snapshot.snapshot_id), Rejection::SnapshotNotCreated)
            })?;
        let config = self.network_config(&snapshot.network)?;

        if let Some(project_id) = &request.project_id {
            self.transition_project(requester, project_id, |project| {
                lifecycle::project::request_attach_node(project.status)?;
                project.node_count += 1;
                Ok(())
            })?;
        }

        let now = Utc::now();
        let node = Node {
            node_id: NodeId::generate(&requester.user_id, &request.name),
            user_id: requester.user_id,
            project_id: request.project_id,
            snapshot_id: snapshot.snapshot_id,
            network: snapshot.network.clone(),
            name: request.name,
            moniker: request.moniker,
            description: request.description,
            size_gigabytes: request.size_gigabytes.unwrap_or(config.default_size_gigabytes),
            region: request.region,
            file_system_type: request.file_system_type,
            tags: request.tags,
            status: NodeStatus::CreatePending,
            message: None,
            detail: None,
            volume: None,
            droplet: None,
            fullnode_info: None,
            create_process: None,
            validator: None,
            monitoring: None,
            created_at: now,
            updated_at: now,
            create_processed_at: None,
            delete_processed_at: None,
        };

        if let Err(e) = self.store.put_node(&node) {
            if let Some(project_id) = &node.project_id {
                if let Err(release_error) = self.release_project_slot(project_id) {
                    error!(project_id = %project_id, error = %release_error, "Failed to release project node slot");
                }
            }
            return Err(e.into());
        }

        let node_id = node.node_id;
        self.publish(
            commands::create_node(&node, &snapshot_cloud_id, &config),
            format!("node {node_id}"),
            |reason| self.fail_node(&node_id, &[NodeStatus::CreatePending], NodeStatus::CreateFail, reason),
        )
        .await?;

        info!(
            node_id = %node.node_id,
            snapshot_id = %node.snapshot_id,
            network = %node.network,
            "Requested node creation"
        );
        Ok(node)
    }

    async fn get_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node> {
        self.load_node(requester, node_id)
    }

    async fn list_nodes(&self, requester: &Requester, page: Page) -> Result<Listing<Node>> {
        let mut nodes = if requester.is_admin() {
            self.store.list_all_nodes()?
        } else {
            self.store.list_nodes_by_user(&requester.user_id)?
        };
        nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(nodes, &self.config))
    }

    async fn retry_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node> {
        let current = self.load_node(requester, node_id)?;
        lifecycle::node::request_retry(current.status)
            .map_err(|reason| ControlError::rejected(format!("node {node_id}"), reason))?;
        let command = self.provisioning_command(&current)?;

        let node = self.transition_node(requester, node_id, |node| {
            node.status = lifecycle::node::request_retry(node.status)?;
            node.message = None;
            node.detail = None;
            Ok(())
        })?;

        self.publish(command, format!("node {node_id}"), |reason| {
            self.fail_node(node_id, &[NodeStatus::CreateRetrying], NodeStatus::CreateFail, reason)
        })
        .await?;

        info!(
            node_id = %node_id,
            resume = node.create_process.is_some(),
            "Requested node creation retry"
        );
        Ok(node)
    }

    async fn delete_node(&self, requester: &Requester, node_id: &NodeId) -> Result<Node> {
        let node = self.transition_node(requester, node_id, |node| {
            node.status = lifecycle::node::request_delete(node.status)?;
            Ok(())
        })?;

        self.publish(commands::delete_node(&node), format!("node {node_id}"), |reason| {
            self.fail_node(node_id, &[NodeStatus::DeletePending], NodeStatus::DeleteFail, reason)
        })
        .await?;

        info!(node_id = %node_id, "Requested node deletion");
        Ok(node)
    }

    async fn attach_validator(&self, requester: &Requester, node_id: &NodeId, validator: Validator) -> Result<Node> {
        if validator.validator_address.trim().is_empty() {
            return Err(ControlError::InvalidRequest(
                "validator address must not be empty".to_string(),
            ));
        }

        let node = self.transition_node(requester, node_id, |node| {
            let status = lifecycle::node::request_attach_validator(node.status, node.fullnode_info.is_some())?;
            node.validator = Some(validator.clone());
            node.monitoring = Some(Monitoring {
                status,
                message: None,
                detail: None,
                processed_at: None,
            });
            Ok(())
        })?;

        self.store.put_validator_monitor(&ValidatorMonitor {
            monitor_id: MonitorId::generate(&node.user_id, &validator.validator_address),
            node_id: node.node_id,
            user_id: node.user_id,
            network: node.network.clone(),
            validator_address: validator.validator_address.clone(),
            created_at: Utc::now(),
        })?;
        self.publish(
            commands::register_validator(&node, &validator),
            format!("node {node_id}"),
            |reason| self.fail_monitoring(node_id, reason),
        )
        .await?;

        info!(
            node_id = %node_id,
            validator_address = %validator.validator_address,
            "Requested validator monitoring"
        );
        Ok(node)
    }

    async fn get_validator_info(&self, requester: &Requester, node_id: &NodeId) -> Result<ValidatorInfo> {
        let node = self.load_node(requester, node_id)?;
        let validator = node
            .validator
            .as_ref()
            .ok_or_else(|| ControlError::rejected(format!("node {node_id}"), Rejection::NoValidator))?;
        let config = self.network_config(&node.network)?;

        self.chain.validator_info(&config.chain, validator).await
    }

    // =========================================================================
    // Networks
    // =========================================================================

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        let mut networks: Vec<_> = self
            .store
            .list_network_configs()?
            .into_iter()
            .map(|config| NetworkSummary {
                network: config.network,
                name: config.name,
            })
            .collect();
        networks.sort_by(|a, b| a.network.cmp(&b.network));
        Ok(networks)
    }
}
