//! Local store - the durable cache of remote tables.
//!
//! Each table is kept as one JSON array of records under its own key. The
//! store is a best-effort cache: reads never fail, they log and come back
//! empty when the backend is unavailable or the stored data is corrupt.

use crate::operation::{OperationKind, PendingOperation};
use crate::storage::{KeySpace, StorageBackend};
use crate::{error::Result, record::patch_fields, Record, TableName, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable per-table record cache.
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    keys: KeySpace,
    /// Serializes read-modify-write cycles on table arrays.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a store over a backend, namespacing keys with `prefix`.
    pub fn new(backend: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            keys: KeySpace::new(prefix),
            write_lock: Mutex::new(()),
        }
    }

    /// Cached records of a table, in insertion order. Empty if nothing is
    /// cached or the cache cannot be read.
    pub async fn get(&self, table: &str) -> Vec<Record> {
        match self.load(table).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "local cache unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// A single cached record.
    pub async fn find(&self, table: &str, id: &str) -> Option<Record> {
        self.get(table).await.into_iter().find(|r| r.id == id)
    }

    /// Insert or replace a record by id. A replaced record keeps its position.
    pub async fn put(&self, table: &str, record: Record) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.get(table).await;
        upsert(&mut records, record);
        self.save(table, &records).await
    }

    /// Remove a record. Returns whether it was present.
    pub async fn delete(&self, table: &str, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.get(table).await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(table, &records).await?;
        Ok(true)
    }

    /// Replace the whole table.
    pub async fn replace(&self, table: &str, records: &[Record]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save(table, records).await
    }

    /// Names of all cached tables.
    pub async fn tables(&self) -> Vec<TableName> {
        let prefix = self.keys.cache_prefix();
        match self.backend.keys(&prefix).await {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "cannot list cached tables");
                Vec::new()
            }
        }
    }

    /// Record count per cached table.
    pub async fn storage_info(&self) -> BTreeMap<TableName, usize> {
        let mut info = BTreeMap::new();
        for table in self.tables().await {
            let count = self.get(&table).await.len();
            info.insert(table, count);
        }
        info
    }

    /// Drop every cached table.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let prefix = self.keys.cache_prefix();
        for key in self.backend.keys(&prefix).await? {
            self.backend.remove(&key).await?;
        }
        Ok(())
    }

    /// Persisted time of the last completed sync.
    pub async fn last_sync(&self) -> Option<Timestamp> {
        match self.backend.read(&self.keys.last_sync()).await {
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(ts) => Some(ts),
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring malformed last sync timestamp");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read last sync timestamp");
                None
            }
        }
    }

    pub async fn set_last_sync(&self, timestamp: Timestamp) -> Result<()> {
        self.backend
            .write(&self.keys.last_sync(), &timestamp.to_string())
            .await
    }

    async fn load(&self, table: &str) -> Result<Vec<Record>> {
        match self.backend.read(&self.keys.table(table)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, table: &str, records: &[Record]) -> Result<()> {
        let raw = serde_json::to_string(records)?;
        self.backend.write(&self.keys.table(table), &raw).await?;
        tracing::debug!(table = %table, count = records.len(), "local table saved");
        Ok(())
    }
}

/// Insert or replace by id, keeping the position of a replaced record.
pub fn upsert(records: &mut Vec<Record>, record: Record) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Re-apply still-queued operations on top of rows fetched from the remote,
/// so a refresh does not hide writes the remote has not seen yet.
///
/// Operations for other tables are ignored; order is the queue order.
pub fn apply_pending(records: &mut Vec<Record>, table: &str, ops: &[PendingOperation]) {
    for op in ops.iter().filter(|op| op.table == table) {
        match op.kind {
            OperationKind::Create => {
                let Some(payload) = op.payload.clone() else {
                    continue;
                };
                match Record::from_value(payload) {
                    Ok(record) => upsert(records, record),
                    Err(e) => {
                        tracing::warn!(op_id = %op.id, error = %e, "skipping malformed queued create")
                    }
                }
            }
            OperationKind::Update => {
                let Some(patch) = op.payload.as_ref() else {
                    continue;
                };
                let Ok(fields) = patch_fields(patch) else {
                    continue;
                };
                if let Some(existing) = records.iter_mut().find(|r| r.id == op.record_id) {
                    existing.merge(fields);
                }
            }
            OperationKind::Delete => records.retain(|r| r.id != op.record_id),
        }
    }
}
