//! Sync engine - optimistic writes, queued replay and table refresh.
//!
//! Every write lands in the [`LocalStore`] first. When the remote is
//! reachable and nothing is queued ahead of it, the write goes straight to the
//! [`RemoteGateway`]; otherwise it becomes a [`PendingOperation`] and is
//! replayed by a later drain, oldest first.
//!
//! # Drains
//!
//! At most one drain runs at a time. It is spawned on the runtime, so a caller
//! that stops waiting never cancels a replay halfway. Callers that ask for a
//! sync while one is running join it and receive its [`SyncReport`].
//!
//! A drain walks the queue in order and stops as soon as connectivity drops.
//! Once a record has a failed or parked operation, later operations for the
//! same record are deferred so that per-record order is kept.

use crate::clock::{Clock, SystemClock};
use crate::config::{SyncConfig, MIN_SYNC_INTERVAL};
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::error::Result;
use crate::events::{EventBus, SyncEvent, SyncTrigger};
use crate::gateway::{GatewayError, GatewayResult, RemoteGateway};
use crate::operation::{OperationId, OperationKind, OperationState, PendingOperation};
use crate::queue::{EnqueueOutcome, PendingQueue};
use crate::record::patch_fields;
use crate::storage::StorageBackend;
use crate::store::{apply_pending, LocalStore};
use crate::{Error, Record, RecordId, TableName, Timestamp};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Coarse state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Disconnected,
}

/// Snapshot of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync: Option<Timestamp>,
    pub pending_count: usize,
    pub phase: SyncPhase,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    /// Operations confirmed and removed from the queue
    pub successful: usize,
    /// Operations attempted that failed
    pub failed: usize,
    /// Operations skipped because an earlier one for the same record failed
    pub deferred: usize,
    /// Tables fetched from the remote
    pub refreshed: Vec<TableName>,
    /// Connectivity was lost before the run finished
    pub abandoned: bool,
}

impl SyncReport {
    fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            successful: 0,
            failed: 0,
            deferred: 0,
            refreshed: Vec::new(),
            abandoned: false,
        }
    }
}

/// Where a write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    /// Confirmed by the remote
    Remote,
    /// Queued while online, after a failure or behind earlier writes
    Pending,
    /// Queued while offline
    Offline,
    /// Refused by the remote and parked
    Rejected,
}

/// Result of a write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// The record as it now stands, `None` for deletes
    pub record: Option<Record>,
    pub disposition: WriteDisposition,
    /// The queued operation, if one was queued
    pub operation: Option<OperationId>,
}

type SharedRun = Shared<BoxFuture<'static, SyncReport>>;

#[derive(Default)]
struct SyncState {
    last_sync: Option<Timestamp>,
    pending_count: usize,
    in_flight: Option<SharedRun>,
}

struct Inner {
    config: SyncConfig,
    store: LocalStore,
    queue: Mutex<PendingQueue>,
    gateway: Arc<dyn RemoteGateway>,
    monitor: Arc<ConnectivityMonitor>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    state: parking_lot::Mutex<SyncState>,
}

/// Offline-first sync engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub async fn new(
        config: SyncConfig,
        store: LocalStore,
        queue: PendingQueue,
        gateway: Arc<dyn RemoteGateway>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self::with_clock(config, store, queue, gateway, monitor, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        config: SyncConfig,
        store: LocalStore,
        queue: PendingQueue,
        gateway: Arc<dyn RemoteGateway>,
        monitor: Arc<ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = SyncState {
            last_sync: store.last_sync().await,
            pending_count: queue.count(),
            in_flight: None,
        };
        let events = EventBus::new(config.event_capacity);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                queue: Mutex::new(queue),
                gateway,
                monitor,
                events,
                clock,
                state: parking_lot::Mutex::new(state),
            }),
        }
    }

    /// Build the store and queue over one backend using the configured prefix.
    pub async fn open(
        config: SyncConfig,
        backend: Arc<dyn StorageBackend>,
        gateway: Arc<dyn RemoteGateway>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Result<Self> {
        let store = LocalStore::new(Arc::clone(&backend), config.key_prefix.clone());
        let queue = PendingQueue::open(backend, config.key_prefix.clone()).await?;
        Ok(Self::new(config, store, queue, gateway, monitor).await)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.monitor
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.inner.state.lock();
        let is_online = self.inner.monitor.is_online();
        let is_syncing = state.in_flight.is_some();
        let phase = if !is_online {
            SyncPhase::Disconnected
        } else if is_syncing {
            SyncPhase::Syncing
        } else {
            SyncPhase::Idle
        };

        SyncStatus {
            is_online,
            is_syncing,
            last_sync: state.last_sync,
            pending_count: state.pending_count,
            phase,
        }
    }

    /// Receive sync notifications. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.inner.monitor.subscribe()
    }

    /// Every queued operation, parked ones included, oldest first.
    pub async fn pending_operations(&self) -> Vec<PendingOperation> {
        self.inner.queue.lock().await.list()
    }

    /// Record count per cached table.
    pub async fn storage_info(&self) -> BTreeMap<TableName, usize> {
        self.inner.store.storage_info().await
    }

    /// The local copy of a table, without asking the remote.
    pub async fn cached_records(&self, table: &str) -> Vec<Record> {
        self.inner.store.get(table).await
    }

    /// Read a table. Online reads go to the remote and refresh the cache;
    /// any failure falls back to the cached copy. Never fails.
    pub async fn get_records(&self, table: &str) -> Vec<Record> {
        let inner = &self.inner;
        if inner.monitor.is_online() {
            match inner.select(table).await {
                Ok(rows) => {
                    inner.monitor.report_reachable();
                    return inner.cache_remote(table, rows).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        inner.monitor.report_unreachable();
                    }
                    tracing::warn!(table = %table, error = %e, "remote read failed, serving cached copy");
                }
            }
        }
        inner.store.get(table).await
    }

    /// Create a record. `value` must be an object with a string `id`.
    pub async fn create_record(&self, table: &str, value: Value) -> Result<WriteOutcome> {
        let record = Record::from_value(value)?;
        self.inner.store_locally(table, record.clone()).await;

        let op = PendingOperation::create(
            table,
            record.id.clone(),
            record.to_value(),
            self.inner.clock.now(),
        );
        self.submit(op, Some(record)).await
    }

    /// Shallow-merge `patch` into a record.
    pub async fn update_record(&self, table: &str, id: &str, patch: Value) -> Result<WriteOutcome> {
        let mut fields = patch_fields(&patch)?.clone();
        fields.remove("id");

        let merged = match self.inner.store.find(table, id).await {
            Some(mut existing) => {
                existing.merge(&fields);
                existing
            }
            None => Record::new(id, fields.clone()),
        };
        self.inner.store_locally(table, merged.clone()).await;

        let op = PendingOperation::update(table, id, Value::Object(fields), self.inner.clock.now());
        self.submit(op, Some(merged)).await
    }

    pub async fn delete_record(&self, table: &str, id: &str) -> Result<WriteOutcome> {
        if let Err(e) = self.inner.store.delete(table, id).await {
            tracing::warn!(table = %table, record_id = %id, error = %e, "optimistic local delete failed");
        }

        let op = PendingOperation::delete(table, id, self.inner.clock.now());
        self.submit(op, None).await
    }

    /// Sync now. Replays the queue if anything is waiting, otherwise
    /// refreshes the cached tables.
    pub async fn force_sync(&self) -> SyncReport {
        self.sync(SyncTrigger::Manual).await
    }

    /// Refresh every cached table from the remote, leaving the queue alone.
    pub async fn reload_from_remote(&self) -> SyncReport {
        self.sync(SyncTrigger::Reload).await
    }

    /// Run a sync, or join the one already running.
    ///
    /// Periodic and queued triggers do nothing when no operation is waiting.
    pub async fn sync(&self, trigger: SyncTrigger) -> SyncReport {
        if matches!(trigger, SyncTrigger::Periodic | SyncTrigger::Queued)
            && self.inner.queue.lock().await.active_count() == 0
        {
            return SyncReport::new(trigger);
        }

        let run = {
            let mut state = self.inner.state.lock();
            match &state.in_flight {
                Some(run) => {
                    tracing::debug!(?trigger, "sync already running, joining it");
                    run.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let handle = tokio::spawn(async move {
                        let guard = InFlightGuard(Arc::clone(&inner));
                        let report = inner.run(trigger).await;
                        drop(guard);
                        inner.events.publish(SyncEvent::SyncCompleted {
                            successful: report.successful,
                            failed: report.failed,
                        });
                        report
                    });
                    let run = async move {
                        handle.await.unwrap_or_else(|e| {
                            tracing::error!(error = %e, "sync task failed");
                            let mut report = SyncReport::new(trigger);
                            report.abandoned = true;
                            report
                        })
                    }
                    .boxed()
                    .shared();
                    state.in_flight = Some(run.clone());
                    run
                }
            }
        };
        run.await
    }

    /// Put a parked operation back in line and drain if online.
    pub async fn retry_operation(&self, id: OperationId) -> Result<()> {
        {
            let mut queue = self.inner.queue.lock().await;
            queue.retry(id).await?;
            self.inner.note_pending(&queue);
        }
        tracing::info!(op_id = %id, "operation requeued");
        if self.inner.monitor.is_online() {
            self.request_drain();
        }
        Ok(())
    }

    /// Drop an operation for good. The remote never sees it; when online the
    /// table is refreshed so the local copy stops showing it.
    pub async fn discard_operation(&self, id: OperationId) -> Result<PendingOperation> {
        let op = {
            let mut queue = self.inner.queue.lock().await;
            let op = queue.get(id).cloned().ok_or(Error::OperationNotFound(id))?;
            queue.remove(id).await?;
            self.inner.note_pending(&queue);
            op
        };
        tracing::info!(op_id = %id, table = %op.table, record_id = %op.record_id, "operation discarded");

        if self.inner.monitor.is_online() {
            match self.inner.select(&op.table).await {
                Ok(rows) => {
                    self.inner.cache_remote(&op.table, rows).await;
                }
                Err(e) => {
                    tracing::warn!(table = %op.table, error = %e, "refresh after discard failed");
                }
            }
        }
        Ok(op)
    }

    /// Spawn the background tasks: a connectivity listener that syncs on
    /// reconnection, and the periodic timer.
    pub fn start(&self) -> SyncWorker {
        let listener = {
            let engine = self.clone();
            let mut rx = self.inner.monitor.subscribe();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let state = *rx.borrow_and_update();
                    engine.inner.events.publish(SyncEvent::ConnectivityChanged {
                        online: state.is_online(),
                    });
                    if state.is_online() {
                        engine.sync(SyncTrigger::Reconnect).await;
                    }
                }
            })
        };

        let timer = {
            let engine = self.clone();
            // Struct literals skip the builder clamp.
            let period = self.inner.config.sync_interval.max(MIN_SYNC_INTERVAL);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    // Recovering from a forced offline wakes the listener instead.
                    if engine.inner.monitor.probe() {
                        continue;
                    }
                    if engine.inner.monitor.is_online() {
                        engine.sync(SyncTrigger::Periodic).await;
                    }
                }
            })
        };

        tracing::info!(interval_secs = self.inner.config.sync_interval.as_secs(), "sync worker started");
        SyncWorker {
            tasks: vec![listener, timer],
        }
    }

    async fn submit(&self, op: PendingOperation, local: Option<Record>) -> Result<WriteOutcome> {
        let inner = &self.inner;
        let (table, kind, record_id) = (op.table.clone(), op.kind, op.record_id.clone());

        if !inner.monitor.is_online() {
            let operation = {
                let mut queue = inner.queue.lock().await;
                inner.enqueue(&mut queue, op).await?
            };
            tracing::debug!(table = %table, operation = %kind, record_id = %record_id, "offline, write queued");
            inner.events.publish(SyncEvent::SavedOffline {
                table,
                operation: kind,
            });
            return Ok(WriteOutcome {
                record: local,
                disposition: WriteDisposition::Offline,
                operation,
            });
        }

        // Held across the remote call so queued and direct writes reach the
        // remote in the order they were made.
        let mut queue = inner.queue.lock().await;

        if queue.active_count() > 0 || queue.has_pending_for(&table, &record_id) {
            let operation = inner.enqueue(&mut queue, op).await?;
            drop(queue);
            tracing::debug!(table = %table, operation = %kind, record_id = %record_id, "queued behind earlier writes");
            inner.events.publish(SyncEvent::SavedPending {
                table,
                operation: kind,
            });
            self.request_drain();
            return Ok(WriteOutcome {
                record: local,
                disposition: WriteDisposition::Pending,
                operation,
            });
        }

        match inner.execute(&op).await {
            Ok(stored) => {
                drop(queue);
                inner.monitor.report_reachable();
                let record = match stored {
                    Some(record) => {
                        inner.store_locally(&table, record.clone()).await;
                        Some(record)
                    }
                    None => local,
                };
                tracing::debug!(table = %table, operation = %kind, record_id = %record_id, "saved to remote");
                inner.events.publish(SyncEvent::SavedToRemote {
                    table,
                    operation: kind,
                    id: record_id,
                });
                Ok(WriteOutcome {
                    record,
                    disposition: WriteDisposition::Remote,
                    operation: None,
                })
            }
            Err(e) if e.is_transient() => {
                // The remote may have applied it before the failure surfaced.
                let mut op = op;
                op.sent = true;
                let operation = inner.enqueue(&mut queue, op).await?;
                drop(queue);
                inner.monitor.report_unreachable();
                tracing::warn!(table = %table, operation = %kind, record_id = %record_id, error = %e, "remote write failed, queued");
                inner.events.publish(SyncEvent::SavedPending {
                    table,
                    operation: kind,
                });
                Ok(WriteOutcome {
                    record: local,
                    disposition: WriteDisposition::Pending,
                    operation,
                })
            }
            Err(e) => {
                let operation = inner.enqueue(&mut queue, op).await?;
                if let Some(op_id) = operation {
                    queue.park(op_id, OperationState::Rejected, e.message.clone()).await?;
                }
                drop(queue);
                tracing::warn!(table = %table, operation = %kind, record_id = %record_id, error = %e, "remote rejected write");
                if let Some(op_id) = operation {
                    inner.events.publish(SyncEvent::OperationRejected {
                        op_id,
                        table,
                        operation: kind,
                        id: record_id,
                        reason: e.message,
                    });
                }
                Ok(WriteOutcome {
                    record: local,
                    disposition: WriteDisposition::Rejected,
                    operation,
                })
            }
        }
    }

    fn request_drain(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.sync(SyncTrigger::Queued).await;
        });
    }
}

impl Inner {
    async fn run(&self, trigger: SyncTrigger) -> SyncReport {
        let mut report = SyncReport::new(trigger);
        tracing::info!(?trigger, "sync started");
        self.events.publish(SyncEvent::SyncStarted { trigger });

        let (replay, refresh) = match trigger {
            SyncTrigger::Manual => {
                let waiting = self.queue.lock().await.active_count() > 0;
                (waiting, !waiting)
            }
            SyncTrigger::Reload => (false, true),
            SyncTrigger::Queued => (true, false),
            SyncTrigger::Reconnect | SyncTrigger::Periodic => (true, true),
        };

        if replay {
            self.replay(&mut report).await;
        }
        if refresh && !report.abandoned {
            self.refresh(&mut report).await;
        }

        if !report.abandoned {
            let now = self.clock.now();
            if let Err(e) = self.store.set_last_sync(now).await {
                tracing::warn!(error = %e, "cannot persist last sync timestamp");
            }
            self.state.lock().last_sync = Some(now);
        }

        tracing::info!(
            ?trigger,
            successful = report.successful,
            failed = report.failed,
            deferred = report.deferred,
            abandoned = report.abandoned,
            "sync finished"
        );
        report
    }

    async fn replay(&self, report: &mut SyncReport) {
        let mut cursor = OperationId::UNASSIGNED;
        let mut blocked: HashSet<(TableName, RecordId)> = HashSet::new();

        loop {
            if !self.monitor.is_online() {
                tracing::info!("connectivity lost, drain abandoned");
                report.abandoned = true;
                break;
            }

            let mut queue = self.queue.lock().await;
            let Some(mut op) = queue.next_after(cursor) else {
                break;
            };
            cursor = op.id;

            let key = (op.table.clone(), op.record_id.clone());
            if op.state.is_parked() {
                blocked.insert(key);
                continue;
            }
            if blocked.contains(&key) {
                tracing::debug!(op_id = %op.id, table = %op.table, record_id = %op.record_id, "deferred behind failed operation");
                report.deferred += 1;
                continue;
            }

            match self.execute(&op).await {
                Ok(_) => {
                    if let Err(e) = queue.remove(op.id).await {
                        tracing::warn!(op_id = %op.id, error = %e, "cannot remove confirmed operation");
                    }
                    self.note_pending(&queue);
                    tracing::debug!(op_id = %op.id, table = %op.table, operation = %op.kind, "replayed");
                    report.successful += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    blocked.insert(key);
                    op.last_error = Some(e.message.clone());

                    let event = if !e.is_transient() {
                        op.state = OperationState::Rejected;
                        tracing::warn!(op_id = %op.id, table = %op.table, error = %e, "remote rejected queued operation");
                        Some(SyncEvent::OperationRejected {
                            op_id: op.id,
                            table: op.table.clone(),
                            operation: op.kind,
                            id: op.record_id.clone(),
                            reason: e.message,
                        })
                    } else {
                        // A refusal means nothing was applied; a network
                        // failure leaves that open.
                        op.sent = true;
                        op.attempts += 1;
                        if op.attempts >= self.config.max_attempts {
                            op.state = OperationState::Stalled;
                            tracing::warn!(op_id = %op.id, table = %op.table, attempts = op.attempts, "retry limit reached");
                            Some(SyncEvent::RetryLimitReached {
                                op_id: op.id,
                                table: op.table.clone(),
                                operation: op.kind,
                                id: op.record_id.clone(),
                                attempts: op.attempts,
                            })
                        } else {
                            tracing::debug!(op_id = %op.id, attempts = op.attempts, error = %e, "replay failed, will retry");
                            None
                        }
                    };

                    if let Err(e) = queue.update(&op).await {
                        tracing::warn!(op_id = %op.id, error = %e, "cannot persist operation state");
                    }
                    drop(queue);
                    if let Some(event) = event {
                        self.events.publish(event);
                    }
                }
            }
        }
    }

    async fn refresh(&self, report: &mut SyncReport) {
        let mut tables: BTreeSet<TableName> = self.config.tables.iter().cloned().collect();
        tables.extend(self.store.tables().await);

        for table in tables {
            if !self.monitor.is_online() {
                tracing::info!("connectivity lost, refresh abandoned");
                report.abandoned = true;
                break;
            }
            match self.select(&table).await {
                Ok(rows) => {
                    self.cache_remote(&table, rows).await;
                    report.refreshed.push(table);
                }
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "refresh failed, keeping cached copy");
                }
            }
        }
    }

    /// Cache rows fetched from the remote with queued writes laid over them.
    async fn cache_remote(&self, table: &str, mut rows: Vec<Record>) -> Vec<Record> {
        let pending = self.queue.lock().await.for_table(table);
        apply_pending(&mut rows, table, &pending);
        if let Err(e) = self.store.replace(table, &rows).await {
            tracing::warn!(table = %table, error = %e, "cannot cache remote rows");
        }
        rows
    }

    async fn store_locally(&self, table: &str, record: Record) {
        let id = record.id.clone();
        if let Err(e) = self.store.put(table, record).await {
            tracing::error!(table = %table, record_id = %id, error = %e, "optimistic local write lost");
        }
    }

    async fn enqueue(&self, queue: &mut PendingQueue, op: PendingOperation) -> Result<Option<OperationId>> {
        let outcome = queue.enqueue(op).await?;
        self.note_pending(queue);
        Ok(match outcome {
            EnqueueOutcome::Queued(id) => Some(id),
            EnqueueOutcome::Collapsed { .. } => None,
        })
    }

    fn note_pending(&self, queue: &PendingQueue) {
        self.state.lock().pending_count = queue.count();
    }

    async fn select(&self, table: &str) -> GatewayResult<Vec<Record>> {
        let timeout = self.config.remote_timeout;
        tokio::time::timeout(timeout, self.gateway.select(table))
            .await
            .unwrap_or_else(|_| Err(GatewayError::timeout(timeout)))
    }

    /// Send one operation to the remote. Returns the stored row for creates
    /// and updates.
    async fn execute(&self, op: &PendingOperation) -> GatewayResult<Option<Record>> {
        let timeout = self.config.remote_timeout;
        let call = async {
            match op.kind {
                OperationKind::Create => {
                    let payload = op
                        .payload
                        .clone()
                        .ok_or_else(|| GatewayError::validation("create without payload"))?;
                    let record = Record::from_value(payload)
                        .map_err(|e| GatewayError::validation(e.to_string()))?;
                    self.gateway.insert(&op.table, &record).await.map(Some)
                }
                OperationKind::Update => {
                    let patch = op
                        .payload
                        .as_ref()
                        .ok_or_else(|| GatewayError::validation("update without payload"))?;
                    self.gateway
                        .update(&op.table, &op.record_id, patch)
                        .await
                        .map(Some)
                }
                OperationKind::Delete => self
                    .gateway
                    .delete(&op.table, &op.record_id)
                    .await
                    .map(|()| None),
            }
        };
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| Err(GatewayError::timeout(timeout)))
    }
}

/// Clears the in-flight slot when a run ends, panics included.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.state.lock().in_flight = None;
    }
}

/// Handle on the background tasks started by [`SyncEngine::start`]. The
/// tasks stop when this is shut down or dropped; a drain already running is
/// left to finish.
pub struct SyncWorker {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn shutdown(mut self) {
        self.abort();
        tracing::info!("sync worker stopped");
    }

    /// True while every background task is alive.
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|task| !task.is_finished())
    }

    fn abort(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.abort();
    }
}
