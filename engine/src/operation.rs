//! Pending operations: writes that have not been confirmed by the remote.
//!
//! Every write that cannot reach the remote immediately is captured as a
//! [`PendingOperation`] and replayed later, oldest first.

use crate::{RecordId, TableName, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sequence number of a queued operation. Assigned by the queue, strictly
/// increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
    /// Placeholder for operations the queue has not numbered yet.
    pub const UNASSIGNED: OperationId = OperationId(0);

    /// Whether the queue has assigned this id.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Replay state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// Waiting for the next drain
    #[default]
    Pending,
    /// The remote refused it (validation error); held until acknowledged
    Rejected,
    /// Hit the retry cap on transient failures; held until retried
    Stalled,
}

impl OperationState {
    /// Parked operations are skipped by drains.
    pub fn is_parked(&self) -> bool {
        !matches!(self, OperationState::Pending)
    }
}

/// A write waiting to be replayed against the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Queue sequence number
    pub id: OperationId,
    /// Target table
    pub table: TableName,
    /// Create, update or delete
    pub kind: OperationKind,
    /// Target record
    pub record_id: RecordId,
    /// Full record for creates, field patch for updates, `None` for deletes
    pub payload: Option<Value>,
    /// When the write happened locally
    pub created_at: Timestamp,
    /// Failed replay attempts so far
    pub attempts: u32,
    /// The remote has seen this operation at least once and may have applied
    /// it even though no confirmation arrived
    #[serde(default)]
    pub sent: bool,
    /// Replay state
    #[serde(default)]
    pub state: OperationState,
    /// Message of the most recent failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingOperation {
    fn new(
        table: impl Into<TableName>,
        kind: OperationKind,
        record_id: impl Into<RecordId>,
        payload: Option<Value>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: OperationId::UNASSIGNED,
            table: table.into(),
            kind,
            record_id: record_id.into(),
            payload,
            created_at,
            attempts: 0,
            sent: false,
            state: OperationState::Pending,
            last_error: None,
        }
    }

    /// A create carrying the full record.
    pub fn create(
        table: impl Into<TableName>,
        record_id: impl Into<RecordId>,
        record: Value,
        created_at: Timestamp,
    ) -> Self {
        Self::new(table, OperationKind::Create, record_id, Some(record), created_at)
    }

    /// An update carrying only the changed fields.
    pub fn update(
        table: impl Into<TableName>,
        record_id: impl Into<RecordId>,
        patch: Value,
        created_at: Timestamp,
    ) -> Self {
        Self::new(table, OperationKind::Update, record_id, Some(patch), created_at)
    }

    /// A delete.
    pub fn delete(
        table: impl Into<TableName>,
        record_id: impl Into<RecordId>,
        created_at: Timestamp,
    ) -> Self {
        Self::new(table, OperationKind::Delete, record_id, None, created_at)
    }

    /// Whether this operation targets the given record.
    pub fn targets(&self, table: &str, record_id: &str) -> bool {
        self.table == table && self.record_id == record_id
    }

    /// Whether the operation is waiting to be replayed.
    pub fn is_active(&self) -> bool {
        !self.state.is_parked()
    }
}
