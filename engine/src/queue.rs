//! Pending-operation queue - the durable log of unconfirmed writes.
//!
//! The queue is kept in memory and written through to the backend on every
//! mutation, so a mutation is durable once the call returns.
//!
//! # Collapsing
//!
//! Enqueueing a delete removes queued updates for the same record: the delete
//! supersedes them. If a create for that record is still queued and has never
//! been sent, the record never existed remotely, so the create is dropped
//! as well and the delete is not queued at all.

use crate::operation::{OperationId, OperationKind, OperationState, PendingOperation};
use crate::storage::{KeySpace, StorageBackend};
use crate::{error::Result, Error};
use std::sync::Arc;

/// What `enqueue` did with an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the log under this id
    Queued(OperationId),
    /// Cancelled against earlier entries, which were removed
    Collapsed { removed: Vec<OperationId> },
}

/// Durable FIFO of pending operations.
pub struct PendingQueue {
    backend: Arc<dyn StorageBackend>,
    keys: KeySpace,
    ops: Vec<PendingOperation>,
    last_id: u64,
}

impl PendingQueue {
    /// Load the queue persisted under `prefix`.
    ///
    /// A corrupt log is logged and replaced by an empty one; the sequence
    /// counter still moves past any id it held so ids are never reused.
    pub async fn open(backend: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Result<Self> {
        let keys = KeySpace::new(prefix);

        let ops: Vec<PendingOperation> = match backend.read(&keys.pending_ops()).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(ops) => ops,
                Err(e) => {
                    tracing::error!(error = %e, "pending operation log is corrupt, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let stored_seq = match backend.read(&keys.pending_seq()).await? {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or(0),
            None => 0,
        };
        let max_op = ops.iter().map(|op| op.id.0).max().unwrap_or(0);

        if !ops.is_empty() {
            tracing::info!(count = ops.len(), "restored pending operations");
        }

        Ok(Self {
            backend,
            keys,
            ops,
            last_id: stored_seq.max(max_op),
        })
    }

    /// Append an operation, applying the collapsing rule for deletes.
    ///
    /// A delete cancels a queued create only if that create never reached the
    /// remote. Once sent, the row may exist remotely and the delete must go out.
    pub async fn enqueue(&mut self, mut op: PendingOperation) -> Result<EnqueueOutcome> {
        let mut removed = Vec::new();

        if op.kind == OperationKind::Delete {
            let (table, record_id) = (op.table.clone(), op.record_id.clone());
            let never_sent_create = self.ops.iter().any(|queued| {
                queued.kind == OperationKind::Create
                    && queued.targets(&table, &record_id)
                    && !queued.sent
                    && queued.attempts == 0
            });

            self.ops.retain(|queued| {
                let drop = queued.targets(&table, &record_id)
                    && (queued.kind == OperationKind::Update
                        || (never_sent_create && queued.kind == OperationKind::Create));
                if drop {
                    removed.push(queued.id);
                }
                !drop
            });

            if never_sent_create {
                self.persist().await?;
                tracing::debug!(table = %table, record_id = %record_id, removed = removed.len(), "delete collapsed against queued create");
                return Ok(EnqueueOutcome::Collapsed { removed });
            }
        }

        if op.id.is_assigned() {
            self.last_id = self.last_id.max(op.id.0);
        } else {
            self.last_id += 1;
            op.id = OperationId(self.last_id);
        }
        let id = op.id;

        tracing::debug!(op_id = %id, table = %op.table, kind = %op.kind, record_id = %op.record_id, superseded = removed.len(), "operation queued");
        self.ops.push(op);
        if let Err(e) = self.persist().await {
            // Not durable, so not queued.
            self.ops.pop();
            return Err(e);
        }

        Ok(EnqueueOutcome::Queued(id))
    }

    /// All operations, oldest first.
    pub fn list(&self) -> Vec<PendingOperation> {
        self.ops.clone()
    }

    /// Queued operations for one table, oldest first.
    pub fn for_table(&self, table: &str) -> Vec<PendingOperation> {
        self.ops.iter().filter(|op| op.table == table).cloned().collect()
    }

    pub fn get(&self, id: OperationId) -> Option<&PendingOperation> {
        self.ops.iter().find(|op| op.id == id)
    }

    /// The oldest operation queued after `cursor`. Ids grow in queue order,
    /// so walking with this sees operations appended mid-walk.
    pub fn next_after(&self, cursor: OperationId) -> Option<PendingOperation> {
        self.ops.iter().find(|op| op.id > cursor).cloned()
    }

    /// Remove a confirmed operation. Returns whether it was queued.
    pub async fn remove(&mut self, id: OperationId) -> Result<bool> {
        let before = self.ops.len();
        self.ops.retain(|op| op.id != id);
        if self.ops.len() == before {
            return Ok(false);
        }
        self.persist().await?;
        Ok(true)
    }

    /// Overwrite the stored copy of an operation (attempts, state, error).
    pub async fn update(&mut self, op: &PendingOperation) -> Result<()> {
        let slot = self
            .ops
            .iter_mut()
            .find(|queued| queued.id == op.id)
            .ok_or(Error::OperationNotFound(op.id))?;
        *slot = op.clone();
        self.persist().await
    }

    /// Hold an operation out of future drains.
    pub async fn park(
        &mut self,
        id: OperationId,
        state: OperationState,
        error: impl Into<String>,
    ) -> Result<()> {
        let op = self
            .ops
            .iter_mut()
            .find(|queued| queued.id == id)
            .ok_or(Error::OperationNotFound(id))?;
        op.state = state;
        op.last_error = Some(error.into());
        self.persist().await
    }

    /// Put a parked operation back in line with a fresh retry budget. Whether
    /// it was ever sent is kept.
    pub async fn retry(&mut self, id: OperationId) -> Result<()> {
        let op = self
            .ops
            .iter_mut()
            .find(|queued| queued.id == id)
            .ok_or(Error::OperationNotFound(id))?;
        op.state = OperationState::Pending;
        op.attempts = 0;
        op.last_error = None;
        self.persist().await
    }

    pub fn count(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operations that the next drain will attempt.
    pub fn active_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_active()).count()
    }

    /// Whether anything is queued for this record, parked or not.
    pub fn has_pending_for(&self, table: &str, record_id: &str) -> bool {
        self.ops.iter().any(|op| op.targets(table, record_id))
    }

    /// Drop everything.
    pub async fn clear(&mut self) -> Result<()> {
        self.ops.clear();
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.ops)?;
        self.backend.write(&self.keys.pending_ops(), &raw).await?;
        self.backend
            .write(&self.keys.pending_seq(), &self.last_id.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    async fn queue() -> (Arc<MemoryBackend>, PendingQueue) {
        let backend = Arc::new(MemoryBackend::new());
        let queue = PendingQueue::open(backend.clone(), "gym_").await.unwrap();
        (backend, queue)
    }

    fn create(id: &str) -> PendingOperation {
        PendingOperation::create("subscribers", id, json!({"id": id}), 1000)
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let (_, mut queue) = queue().await;

        let a = queue.enqueue(create("m1")).await.unwrap();
        let b = queue.enqueue(create("m2")).await.unwrap();

        assert_eq!(a, EnqueueOutcome::Queued(OperationId(1)));
        assert_eq!(b, EnqueueOutcome::Queued(OperationId(2)));
        assert_eq!(queue.count(), 2);
    }

    #[tokio::test]
    async fn next_after_walks_in_order() {
        let (_, mut queue) = queue().await;
        queue.enqueue(create("m1")).await.unwrap();
        queue.enqueue(create("m2")).await.unwrap();

        let first = queue.next_after(OperationId::UNASSIGNED).unwrap();
        assert_eq!(first.record_id, "m1");

        queue.remove(first.id).await.unwrap();
        queue.enqueue(create("m3")).await.unwrap();

        let second = queue.next_after(first.id).unwrap();
        assert_eq!(second.record_id, "m2");
        let third = queue.next_after(second.id).unwrap();
        assert_eq!(third.record_id, "m3");
        assert!(queue.next_after(third.id).is_none());
    }

    #[tokio::test]
    async fn keeps_explicit_ids_and_moves_past_them() {
        let (_, mut queue) = queue().await;
        let mut op = create("m1");
        op.id = OperationId(40);

        assert_eq!(
            queue.enqueue(op).await.unwrap(),
            EnqueueOutcome::Queued(OperationId(40))
        );
        assert_eq!(
            queue.enqueue(create("m2")).await.unwrap(),
            EnqueueOutcome::Queued(OperationId(41))
        );
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let (_, mut queue) = queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(create(id)).await.unwrap();
        }
        let ids: Vec<_> = queue.list().into_iter().map(|op| op.record_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn remove_confirmed() {
        let (_, mut queue) = queue().await;
        queue.enqueue(create("m1")).await.unwrap();

        assert!(queue.remove(OperationId(1)).await.unwrap());
        assert!(!queue.remove(OperationId(1)).await.unwrap());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn delete_after_sent_create_is_queued() {
        let (_, mut queue) = queue().await;
        let mut op = create("m1");
        op.sent = true;
        queue.enqueue(op).await.unwrap();

        let outcome = queue
            .enqueue(PendingOperation::delete("subscribers", "m1", 3))
            .await
            .unwrap();

        assert_eq!(outcome, EnqueueOutcome::Queued(OperationId(2)));
        let kinds: Vec<_> = queue.list().into_iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Create, OperationKind::Delete]);
    }

    #[tokio::test]
    async fn retry_keeps_sent_flag() {
        let (_, mut queue) = queue().await;
        let mut op = create("m1");
        op.sent = true;
        op.attempts = 3;
        queue.enqueue(op).await.unwrap();
        queue
            .park(OperationId(1), OperationState::Stalled, "503")
            .await
            .unwrap();

        queue.retry(OperationId(1)).await.unwrap();

        let op = queue.get(OperationId(1)).unwrap();
        assert_eq!(op.attempts, 0);
        assert!(op.sent);
        assert!(matches!(
            queue
                .enqueue(PendingOperation::delete("subscribers", "m1", 4))
                .await
                .unwrap(),
            EnqueueOutcome::Queued(_)
        ));
    }

    #[tokio::test]
    async fn create_then_delete_collapses() {
        let (_, mut queue) = queue().await;
        queue.enqueue(create("m1")).await.unwrap();
        queue
            .enqueue(PendingOperation::update("subscribers", "m1", json!({"name": "x"}), 2))
            .await
            .unwrap();

        let outcome = queue
            .enqueue(PendingOperation::delete("subscribers", "m1", 3))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EnqueueOutcome::Collapsed {
                removed: vec![OperationId(1), OperationId(2)]
            }
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn attempted_create_is_not_collapsed() {
        let (_, mut queue) = queue().await;
        queue.enqueue(create("m1")).await.unwrap();
        let mut op = queue.get(OperationId(1)).unwrap().clone();
        op.attempts = 1;
        queue.update(&op).await.unwrap();

        let outcome = queue
            .enqueue(PendingOperation::delete("subscribers", "m1", 3))
            .await
            .unwrap();

        assert_eq!(outcome, EnqueueOutcome::Queued(OperationId(2)));
        assert_eq!(queue.count(), 2);
    }

    #[tokio::test]
    async fn delete_supersedes_updates() {
        let (_, mut queue) = queue().await;
        queue
            .enqueue(PendingOperation::update("products", "p1", json!({"stock": 1}), 1))
            .await
            .unwrap();
        queue
            .enqueue(PendingOperation::update("products", "p2", json!({"stock": 5}), 2))
            .await
            .unwrap();

        queue
            .enqueue(PendingOperation::delete("products", "p1", 3))
            .await
            .unwrap();

        let kinds: Vec<_> = queue
            .list()
            .into_iter()
            .map(|op| (op.record_id, op.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("p2".to_string(), OperationKind::Update),
                ("p1".to_string(), OperationKind::Delete)
            ]
        );
    }

    #[tokio::test]
    async fn survives_reopen_without_reusing_ids() {
        let (backend, mut queue) = queue().await;
        queue.enqueue(create("m1")).await.unwrap();
        queue.enqueue(create("m2")).await.unwrap();
        queue.remove(OperationId(2)).await.unwrap();

        let mut reopened = PendingQueue::open(backend, "gym_").await.unwrap();
        assert_eq!(reopened.count(), 1);
        assert_eq!(
            reopened.enqueue(create("m3")).await.unwrap(),
            EnqueueOutcome::Queued(OperationId(3))
        );
    }

    #[tokio::test]
    async fn corrupt_log_starts_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("gym_pending_ops", "[{broken");
        backend.insert_raw("gym_pending_seq", "17");

        let mut queue = PendingQueue::open(backend, "gym_").await.unwrap();
        assert!(queue.is_empty());
        assert_eq!(
            queue.enqueue(create("m1")).await.unwrap(),
            EnqueueOutcome::Queued(OperationId(18))
        );
    }

    #[tokio::test]
    async fn park_and_retry() {
        let (_, mut queue) = queue().await;
        queue.enqueue(create("m1")).await.unwrap();
        let mut op = queue.get(OperationId(1)).unwrap().clone();
        op.attempts = 4;
        queue.update(&op).await.unwrap();

        queue
            .park(OperationId(1), OperationState::Rejected, "duplicate key")
            .await
            .unwrap();
        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.count(), 1);
        assert!(queue.has_pending_for("subscribers", "m1"));

        queue.retry(OperationId(1)).await.unwrap();
        let op = queue.get(OperationId(1)).unwrap();
        assert_eq!(op.state, OperationState::Pending);
        assert_eq!(op.attempts, 0);
        assert_eq!(op.last_error, None);
    }

    #[tokio::test]
    async fn unknown_ids_error() {
        let (_, mut queue) = queue().await;
        assert_eq!(
            queue.retry(OperationId(9)).await,
            Err(Error::OperationNotFound(OperationId(9)))
        );
    }

    #[tokio::test]
    async fn failed_persist_surfaces() {
        let (backend, mut queue) = queue().await;
        backend.set_failing(true);
        assert!(matches!(
            queue.enqueue(create("m1")).await,
            Err(Error::Storage(_))
        ));
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_kind() -> impl Strategy<Value = OperationKind> {
            prop_oneof![Just(OperationKind::Update), Just(OperationKind::Delete)]
        }

        proptest! {
            #[test]
            fn prop_unsent_create_then_delete_leaves_no_trace(
                others in proptest::collection::vec((0usize..4, arb_kind()), 0..12),
                follow_ups in 0usize..4,
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                runtime.block_on(async {
                    let (_, mut queue) = queue().await;

                    // Unrelated traffic on other records.
                    for (member, kind) in &others {
                        let id = format!("other{member}");
                        let op = match kind {
                            OperationKind::Delete => PendingOperation::delete("sales", &id, 1),
                            _ => PendingOperation::update("sales", &id, json!({"n": member}), 1),
                        };
                        queue.enqueue(op).await.unwrap();
                    }
                    let before = queue.list();

                    queue.enqueue(create("x")).await.unwrap();
                    for n in 0..follow_ups {
                        queue
                            .enqueue(PendingOperation::update("subscribers", "x", json!({"n": n}), 2))
                            .await
                            .unwrap();
                    }
                    let outcome = queue
                        .enqueue(PendingOperation::delete("subscribers", "x", 3))
                        .await
                        .unwrap();

                    assert!(matches!(outcome, EnqueueOutcome::Collapsed { .. }));
                    assert!(!queue.has_pending_for("subscribers", "x"));
                    assert_eq!(queue.list(), before);
                });
            }
        }
    }
}
