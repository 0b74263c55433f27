//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use valinfra_bus::MemoryBus;
use valinfra_core::{NodeId, ProjectId, Requester, SnapshotId, UserId};
use valinfra_store::{
    ChainParams, NetworkSetupConfig, Node, Project, Result as StoreResult, RocksStore, Snapshot,
    SnapshotStatus, Store, StoreError, ValidatorMonitor,
};

use crate::error::ControlError;
use crate::service::{ControlPlane, ControlPlaneService};
use crate::types::CreateSnapshotRequest;

pub fn seed_network(store: &RocksStore, network: &str, name: &str) {
    store
        .put_network_config(&NetworkSetupConfig {
            network: network.to_string(),
            name: name.to_string(),
            container_name: "gaiad".to_string(),
            setup_script: None,
            status_command: None,
            default_size_gigabytes: 400,
            chain: ChainParams {
                chain_id: network.to_string(),
                rest_url: "http://127.0.0.1:1317".to_string(),
                denom: "uatom".to_string(),
                decimals: 6,
            },
        })
        .unwrap();
}

pub struct Harness {
    _dir: TempDir,
    pub store: Arc<RocksStore>,
    pub bus: Arc<MemoryBus>,
    pub service: ControlPlaneService<RocksStore, MemoryBus>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        seed_network(&store, "cosmoshub-4", "Cosmos Hub");
        let bus = Arc::new(MemoryBus::new());
        let service = ControlPlaneService::with_defaults(Arc::clone(&store), Arc::clone(&bus));
        Self {
            _dir: dir,
            store,
            bus,
            service,
        }
    }

    /// Create a snapshot through the service and force it to `CREATED`.
    pub async fn created_snapshot(&self, requester: &Requester, name: &str) -> Snapshot {
        let snapshot = self
            .service
            .create_snapshot(
                requester,
                CreateSnapshotRequest::new(name, "cosmoshub-4", format!("vol-{name}")),
            )
            .await
            .unwrap();

        self.store
            .update_snapshot(&snapshot.snapshot_id, |s| {
                s.status = SnapshotStatus::Created;
                s.snapshot_cloud_id = Some(format!("snap-{name}"));
                Ok::<_, ControlError>(s.clone())
            })
            .unwrap()
    }
}

/// A `RocksStore` whose node inserts can be made to fail.
pub struct FailingNodeStore {
    pub inner: RocksStore,
    pub fail_node_puts: AtomicBool,
}

impl FailingNodeStore {
    pub fn new(inner: RocksStore) -> Self {
        Self {
            inner,
            fail_node_puts: AtomicBool::new(false),
        }
    }
}

impl Store for FailingNodeStore {
    fn put_project(&self, project: &Project) -> StoreResult<()> {
        self.inner.put_project(project)
    }

    fn get_project(&self, project_id: &ProjectId) -> StoreResult<Option<Project>> {
        self.inner.get_project(project_id)
    }

    fn list_projects_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Project>> {
        self.inner.list_projects_by_user(user_id)
    }

    fn list_all_projects(&self) -> StoreResult<Vec<Project>> {
        self.inner.list_all_projects()
    }

    fn update_project<T, E, F>(&self, project_id: &ProjectId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Project) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.inner.update_project(project_id, f)
    }

    fn put_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.inner.put_snapshot(snapshot)
    }

    fn get_snapshot(&self, snapshot_id: &SnapshotId) -> StoreResult<Option<Snapshot>> {
        self.inner.get_snapshot(snapshot_id)
    }

    fn list_snapshots_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Snapshot>> {
        self.inner.list_snapshots_by_user(user_id)
    }

    fn list_snapshots_by_status(&self, status: SnapshotStatus) -> StoreResult<Vec<Snapshot>> {
        self.inner.list_snapshots_by_status(status)
    }

    fn list_all_snapshots(&self) -> StoreResult<Vec<Snapshot>> {
        self.inner.list_all_snapshots()
    }

    fn update_snapshot<T, E, F>(&self, snapshot_id: &SnapshotId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.inner.update_snapshot(snapshot_id, f)
    }

    fn mark_snapshots_update_pending(&self, snapshot_ids: &[SnapshotId]) -> StoreResult<Vec<Snapshot>> {
        self.inner.mark_snapshots_update_pending(snapshot_ids)
    }

    fn put_node(&self, node: &Node) -> StoreResult<()> {
        if self.fail_node_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Database("disk full".to_string()));
        }
        self.inner.put_node(node)
    }

    fn get_node(&self, node_id: &NodeId) -> StoreResult<Option<Node>> {
        self.inner.get_node(node_id)
    }

    fn list_nodes_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Node>> {
        self.inner.list_nodes_by_user(user_id)
    }

    fn list_nodes_by_project(&self, project_id: &ProjectId) -> StoreResult<Vec<Node>> {
        self.inner.list_nodes_by_project(project_id)
    }

    fn list_all_nodes(&self) -> StoreResult<Vec<Node>> {
        self.inner.list_all_nodes()
    }

    fn update_node<T, E, F>(&self, node_id: &NodeId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Node) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.inner.update_node(node_id, f)
    }

    fn put_network_config(&self, config: &NetworkSetupConfig) -> StoreResult<()> {
        self.inner.put_network_config(config)
    }

    fn get_network_config(&self, network: &str) -> StoreResult<Option<NetworkSetupConfig>> {
        self.inner.get_network_config(network)
    }

    fn list_network_configs(&self) -> StoreResult<Vec<NetworkSetupConfig>> {
        self.inner.list_network_configs()
    }

    fn put_validator_monitor(&self, monitor: &ValidatorMonitor) -> StoreResult<()> {
        self.inner.put_validator_monitor(monitor)
    }

    fn list_validator_monitors_by_node(&self, node_id: &NodeId) -> StoreResult<Vec<ValidatorMonitor>> {
        self.inner.list_validator_monitors_by_node(node_id)
    }
}
