//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use valinfra_core::{NodeId, ProjectId, SnapshotId, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{
    NetworkSetupConfig, Node, Project, Snapshot, SnapshotStatus, UpdateStatus, ValidatorMonitor,
};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes every write so read-modify-write sequences are atomic.
    write_lock: Mutex<()>,
}

/// A mutable document with its index maintenance.
trait Document: Serialize + DeserializeOwned + Clone + PartialEq {
    const CF: &'static str;

    fn key(&self) -> Vec<u8>;

    fn touch(&mut self, now: DateTime<Utc>);

    /// Stage the record and its index entries into `batch`, removing index
    /// entries that `previous` had and `self` no longer has.
    fn stage_indexes(
        &self,
        store: &RocksStore,
        batch: &mut WriteBatch,
        previous: Option<&Self>,
    ) -> Result<()>;
}

impl Document for Project {
    const CF: &'static str = cf::PROJECTS;

    fn key(&self) -> Vec<u8> {
        keys::id_key(&self.project_id)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn stage_indexes(&self, store: &RocksStore, batch: &mut WriteBatch, _: Option<&Self>) -> Result<()> {
        let cf_by_user = store.cf(cf::PROJECTS_BY_USER)?;
        batch.put_cf(&cf_by_user, keys::index_key(&self.user_id, &self.project_id), []);
        Ok(())
    }
}

impl Document for Snapshot {
    const CF: &'static str = cf::SNAPSHOTS;

    fn key(&self) -> Vec<u8> {
        keys::id_key(&self.snapshot_id)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn stage_indexes(
        &self,
        store: &RocksStore,
        batch: &mut WriteBatch,
        previous: Option<&Self>,
    ) -> Result<()> {
        let cf_by_user = store.cf(cf::SNAPSHOTS_BY_USER)?;
        let cf_by_status = store.cf(cf::SNAPSHOTS_BY_STATUS)?;

        batch.put_cf(&cf_by_user, keys::index_key(&self.user_id, &self.snapshot_id), []);

        if let Some(old) = previous.filter(|old| old.status != self.status) {
            batch.delete_cf(&cf_by_status, keys::status_key(old.status.as_u8(), &old.snapshot_id));
        }
        batch.put_cf(&cf_by_status, keys::status_key(self.status.as_u8(), &self.snapshot_id), []);
        Ok(())
    }
}

impl Document for Node {
    const CF: &'static str = cf::NODES;

    fn key(&self) -> Vec<u8> {
        keys::id_key(&self.node_id)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn stage_indexes(
        &self,
        store: &RocksStore,
        batch: &mut WriteBatch,
        previous: Option<&Self>,
    ) -> Result<()> {
        let cf_by_user = store.cf(cf::NODES_BY_USER)?;
        let cf_by_project = store.cf(cf::NODES_BY_PROJECT)?;

        batch.put_cf(&cf_by_user, keys::index_key(&self.user_id, &self.node_id), []);

        if let Some(old_project) = previous
            .and_then(|old| old.project_id)
            .filter(|old| Some(*old) != self.project_id)
        {
            batch.delete_cf(&cf_by_project, keys::index_key(&old_project, &self.node_id));
        }
        if let Some(project_id) = &self.project_id {
            batch.put_cf(&cf_by_project, keys::index_key(project_id, &self.node_id), []);
        }
        Ok(())
    }
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)?;
        debug!(path = %path.as_ref().display(), "Opened document store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_record<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn scan_all<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(Self::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Collect the child IDs of every index entry under `prefix`.
    fn scan_index(&self, cf_name: &'static str, prefix: &[u8]) -> Result<Vec<[u8; 32]>> {
        let cf = self.cf(cf_name)?;
        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            let id = keys::child_id(&key, prefix.len()).ok_or(StoreError::CorruptIndex(cf_name))?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn stage<D: Document>(&self, batch: &mut WriteBatch, doc: &D, previous: Option<&D>) -> Result<()> {
        let cf = self.cf(D::CF)?;
        batch.put_cf(&cf, doc.key(), Self::serialize(doc)?);
        doc.stage_indexes(self, batch, previous)
    }

    fn put_document<D: Document>(&self, doc: &D) -> Result<()> {
        let _guard = self.write_lock.lock();
        let previous: Option<D> = self.get_record(D::CF, &doc.key())?;

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, doc, previous.as_ref())?;
        self.db.write(batch)?;
        Ok(())
    }

    fn read_modify_write<D, T, E, F>(&self, key: &[u8], f: F) -> std::result::Result<T, E>
    where
        D: Document,
        F: FnOnce(&mut D) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let _guard = self.write_lock.lock();
        let current: D = self
            .get_record(D::CF, key)?
            .ok_or(StoreError::NotFound)?;

        let mut next = current.clone();
        let output = f(&mut next)?;

        if next != current {
            next.touch(Utc::now());
            let mut batch = WriteBatch::default();
            self.stage(&mut batch, &next, Some(&current))?;
            self.db.write(batch).map_err(StoreError::from)?;
        }

        Ok(output)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Project Operations
    // =========================================================================

    fn put_project(&self, project: &Project) -> Result<()> {
        self.put_document(project)
    }

    fn get_project(&self, project_id: &ProjectId) -> Result<Option<Project>> {
        self.get_record(cf::PROJECTS, &keys::id_key(project_id))
    }

    fn list_projects_by_user(&self, user_id: &UserId) -> Result<Vec<Project>> {
        self.scan_index(cf::PROJECTS_BY_USER, &keys::prefix(user_id))?
            .into_iter()
            .filter_map(|id| self.get_project(&ProjectId::from_bytes(id)).transpose())
            .collect()
    }

    fn list_all_projects(&self) -> Result<Vec<Project>> {
        self.scan_all(cf::PROJECTS)
    }

    fn update_project<T, E, F>(&self, project_id: &ProjectId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Project) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.read_modify_write(&keys::id_key(project_id), f)
    }

    // =========================================================================
    // Snapshot Operations
    // =========================================================================

    fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.put_document(snapshot)
    }

    fn get_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>> {
        self.get_record(cf::SNAPSHOTS, &keys::id_key(snapshot_id))
    }

    fn list_snapshots_by_user(&self, user_id: &UserId) -> Result<Vec<Snapshot>> {
        self.scan_index(cf::SNAPSHOTS_BY_USER, &keys::prefix(user_id))?
            .into_iter()
            .filter_map(|id| self.get_snapshot(&SnapshotId::from_bytes(id)).transpose())
            .collect()
    }

    fn list_snapshots_by_status(&self, status: SnapshotStatus) -> Result<Vec<Snapshot>> {
        self.scan_index(cf::SNAPSHOTS_BY_STATUS, &keys::status_prefix(status.as_u8()))?
            .into_iter()
            .filter_map(|id| self.get_snapshot(&SnapshotId::from_bytes(id)).transpose())
            .collect()
    }

    fn list_all_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.scan_all(cf::SNAPSHOTS)
    }

    fn update_snapshot<T, E, F>(&self, snapshot_id: &SnapshotId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Snapshot) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.read_modify_write(&keys::id_key(snapshot_id), f)
    }

    fn mark_snapshots_update_pending(&self, snapshot_ids: &[SnapshotId]) -> Result<Vec<Snapshot>> {
        let _guard = self.write_lock.lock();
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut batch = WriteBatch::default();
        let mut marked = Vec::new();

        for snapshot_id in snapshot_ids {
            if !seen.insert(*snapshot_id) {
                continue;
            }
            let Some(current) = self.get_snapshot(snapshot_id)? else {
                continue;
            };
            if current.status != SnapshotStatus::Created || current.is_update_pending() {
                continue;
            }

            let mut next = current.clone();
            next.update_status = Some(UpdateStatus::UpdatePending);
            next.updated_at = now;
            self.stage(&mut batch, &next, Some(&current))?;
            marked.push(next);
        }

        if !marked.is_empty() {
            self.db.write(batch)?;
        }
        debug!(
            requested = snapshot_ids.len(),
            marked = marked.len(),
            "Marked snapshots update pending"
        );

        Ok(marked)
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    fn put_node(&self, node: &Node) -> Result<()> {
        self.put_document(node)
    }

    fn get_node(&self, node_id: &NodeId) -> Result<Option<Node>> {
        self.get_record(cf::NODES, &keys::id_key(node_id))
    }

    fn list_nodes_by_user(&self, user_id: &UserId) -> Result<Vec<Node>> {
        self.scan_index(cf::NODES_BY_USER, &keys::prefix(user_id))?
            .into_iter()
            .filter_map(|id| self.get_node(&NodeId::from_bytes(id)).transpose())
            .collect()
    }

    fn list_nodes_by_project(&self, project_id: &ProjectId) -> Result<Vec<Node>> {
        self.scan_index(cf::NODES_BY_PROJECT, &keys::prefix(project_id))?
            .into_iter()
            .filter_map(|id| self.get_node(&NodeId::from_bytes(id)).transpose())
            .collect()
    }

    fn list_all_nodes(&self) -> Result<Vec<Node>> {
        self.scan_all(cf::NODES)
    }

    fn update_node<T, E, F>(&self, node_id: &NodeId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Node) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.read_modify_write(&keys::id_key(node_id), f)
    }

    // =========================================================================
    // Network Configuration Operations
    // =========================================================================

    fn put_network_config(&self, config: &NetworkSetupConfig) -> Result<()> {
        let cf = self.cf(cf::NETWORK_CONFIGS)?;
        let value = Self::serialize(config)?;
        let _guard = self.write_lock.lock();
        self.db.put_cf(&cf, keys::network_key(&config.network), value)?;
        Ok(())
    }

    fn get_network_config(&self, network: &str) -> Result<Option<NetworkSetupConfig>> {
        self.get_record(cf::NETWORK_CONFIGS, &keys::network_key(network))
    }

    fn list_network_configs(&self) -> Result<Vec<NetworkSetupConfig>> {
        self.scan_all(cf::NETWORK_CONFIGS)
    }

    // =========================================================================
    // Monitoring Operations
    // =========================================================================

    fn put_validator_monitor(&self, monitor: &ValidatorMonitor) -> Result<()> {
        let cf_monitors = self.cf(cf::MONITORS)?;
        let cf_by_node = self.cf(cf::MONITORS_BY_NODE)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_monitors, keys::id_key(&monitor.monitor_id), Self::serialize(monitor)?);
        batch.put_cf(&cf_by_node, keys::index_key(&monitor.node_id, &monitor.monitor_id), []);

        let _guard = self.write_lock.lock();
        self.db.write(batch)?;
        Ok(())
    }

    fn list_validator_monitors_by_node(&self, node_id: &NodeId) -> Result<Vec<ValidatorMonitor>> {
        self.scan_index(cf::MONITORS_BY_NODE, &keys::prefix(node_id))?
            .into_iter()
            .filter_map(|id| self.get_record(cf::MONITORS, &id).transpose())
            .collect()
    }
}
