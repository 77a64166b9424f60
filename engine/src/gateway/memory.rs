use super::{GatewayError, GatewayResult, RemoteGateway};
use crate::record::patch_fields;
use crate::{Record, RecordId, TableName};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// A call received by [`InMemoryGateway`], failed or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Select { table: TableName },
    Insert { table: TableName, id: RecordId },
    Update { table: TableName, id: RecordId },
    Delete { table: TableName, id: RecordId },
}

impl GatewayCall {
    fn target(&self) -> Option<(&str, &str)> {
        match self {
            GatewayCall::Select { .. } => None,
            GatewayCall::Insert { table, id }
            | GatewayCall::Update { table, id }
            | GatewayCall::Delete { table, id } => Some((table, id)),
        }
    }
}

#[derive(Debug, Clone)]
struct Reference {
    table: TableName,
    field: String,
    parent: TableName,
}

#[derive(Debug)]
struct State {
    tables: BTreeMap<TableName, Vec<Record>>,
    references: Vec<Reference>,
    calls: Vec<GatewayCall>,
    reachable: bool,
    latency: Option<Duration>,
    next_failures: VecDeque<GatewayError>,
    record_failures: HashMap<(TableName, RecordId), GatewayError>,
}

/// An in-process authoritative store implementing the remote contract.
///
/// Enforces references between tables the way the real backend does, and can
/// be told to fail, to be unreachable, or to answer slowly.
#[derive(Debug)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tables: BTreeMap::new(),
                references: Vec::new(),
                calls: Vec::new(),
                reachable: true,
                latency: None,
                next_failures: VecDeque::new(),
                record_failures: HashMap::new(),
            }),
        }
    }

    /// Require `table.field` to name an existing row of `parent`.
    pub fn with_reference(
        self,
        table: impl Into<TableName>,
        field: impl Into<String>,
        parent: impl Into<TableName>,
    ) -> Self {
        self.state.lock().references.push(Reference {
            table: table.into(),
            field: field.into(),
            parent: parent.into(),
        });
        self
    }

    /// Load rows without going through the call log.
    pub fn seed(&self, table: impl Into<TableName>, records: Vec<Record>) {
        self.state.lock().tables.insert(table.into(), records);
    }

    /// Current rows of a table.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// When unreachable every call fails with a network error.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Delay every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Fail the next call, whatever it is.
    pub fn fail_next(&self, error: GatewayError) {
        self.state.lock().next_failures.push_back(error);
    }

    /// Fail every write to one record until cleared.
    pub fn fail_record(&self, table: impl Into<TableName>, id: impl Into<RecordId>, error: GatewayError) {
        self.state
            .lock()
            .record_failures
            .insert((table.into(), id.into()), error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.next_failures.clear();
        state.record_failures.clear();
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Number of write calls (insert, update, delete) received.
    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| !matches!(c, GatewayCall::Select { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Log the call, wait out the latency, then decide whether it fails.
    async fn enter(&self, call: GatewayCall) -> GatewayResult<()> {
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(call.clone());
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if !state.reachable {
            return Err(GatewayError::network("remote unreachable"));
        }
        if let Some(error) = state.next_failures.pop_front() {
            return Err(error);
        }
        if let Some((table, id)) = call.target() {
            if let Some(error) = state.record_failures.get(&(table.to_string(), id.to_string())) {
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn check_references(&self, table: &str, record: &Record) -> GatewayResult<()> {
        for reference in self.references.iter().filter(|r| r.table == table) {
            let Some(value) = record.get(&reference.field) else {
                continue;
            };
            let Some(parent_id) = value.as_str() else {
                if value.is_null() {
                    continue;
                }
                return Err(GatewayError::validation(format!(
                    "{}.{} must be a string id",
                    table, reference.field
                )));
            };
            let exists = self
                .tables
                .get(&reference.parent)
                .is_some_and(|rows| rows.iter().any(|r| r.id == parent_id));
            if !exists {
                return Err(GatewayError::validation(format!(
                    "foreign key violation: {}.{} references missing {}/{}",
                    table, reference.field, reference.parent, parent_id
                )));
            }
        }
        Ok(())
    }

    /// Refuse to remove a row that another row still points at.
    fn check_referrers(&self, table: &str, id: &str) -> GatewayResult<()> {
        for reference in self.references.iter().filter(|r| r.parent == table) {
            let referrer = self.tables.get(&reference.table).and_then(|rows| {
                rows.iter()
                    .find(|r| r.get(&reference.field).and_then(Value::as_str) == Some(id))
            });
            if let Some(referrer) = referrer {
                return Err(GatewayError::validation(format!(
                    "foreign key violation: {}/{} is referenced by {}.{} of {}",
                    table, id, reference.table, reference.field, referrer.id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn select(&self, table: &str) -> GatewayResult<Vec<Record>> {
        self.enter(GatewayCall::Select {
            table: table.to_string(),
        })
        .await?;
        Ok(self.rows(table))
    }

    async fn insert(&self, table: &str, record: &Record) -> GatewayResult<Record> {
        self.enter(GatewayCall::Insert {
            table: table.to_string(),
            id: record.id.clone(),
        })
        .await?;

        let mut state = self.state.lock();
        state.check_references(table, record)?;
        let rows = state.tables.entry(table.to_string()).or_default();
        crate::store::upsert(rows, record.clone());
        Ok(record.clone())
    }

    async fn update(&self, table: &str, id: &RecordId, patch: &Value) -> GatewayResult<Record> {
        self.enter(GatewayCall::Update {
            table: table.to_string(),
            id: id.clone(),
        })
        .await?;

        let fields = patch_fields(patch).map_err(|e| GatewayError::validation(e.to_string()))?;
        let mut state = self.state.lock();
        let mut updated = state
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| &r.id == id))
            .cloned()
            .ok_or_else(|| GatewayError::validation(format!("record not found: {table}/{id}")))?;
        updated.merge(fields);
        state.check_references(table, &updated)?;

        let rows = state.tables.entry(table.to_string()).or_default();
        crate::store::upsert(rows, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, table: &str, id: &RecordId) -> GatewayResult<()> {
        self.enter(GatewayCall::Delete {
            table: table.to_string(),
            id: id.clone(),
        })
        .await?;

        let mut state = self.state.lock();
        state.check_referrers(table, id)?;
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|r| &r.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorKind;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn insert_is_upsert() {
        let gateway = InMemoryGateway::new();
        let r = record(json!({"id": "m1", "name": "Ali"}));

        gateway.insert("subscribers", &r).await.unwrap();
        gateway.insert("subscribers", &r).await.unwrap();

        assert_eq!(gateway.rows("subscribers"), vec![r]);
        assert_eq!(gateway.write_count(), 2);
    }

    #[tokio::test]
    async fn update_merges_and_requires_row() {
        let gateway = InMemoryGateway::new();
        gateway.seed("products", vec![record(json!({"id": "p1", "stock": 3, "name": "Whey"}))]);

        let updated = gateway
            .update("products", &"p1".to_string(), &json!({"stock": 2}))
            .await
            .unwrap();
        assert_eq!(updated.to_value(), json!({"id": "p1", "stock": 2, "name": "Whey"}));

        let err = gateway
            .update("products", &"p2".to_string(), &json!({"stock": 2}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Validation);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let gateway = InMemoryGateway::new();
        gateway.seed("sales", vec![record(json!({"id": "s1"}))]);

        gateway.delete("sales", &"s1".to_string()).await.unwrap();
        gateway.delete("sales", &"s1".to_string()).await.unwrap();
        assert!(gateway.rows("sales").is_empty());
    }

    #[tokio::test]
    async fn enforces_references() {
        let gateway = InMemoryGateway::new().with_reference("sales", "subscriber_id", "subscribers");

        let sale = record(json!({"id": "s1", "subscriber_id": "m1"}));
        let err = gateway.insert("sales", &sale).await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Validation);

        gateway
            .insert("subscribers", &record(json!({"id": "m1"})))
            .await
            .unwrap();
        gateway.insert("sales", &sale).await.unwrap();
    }

    #[tokio::test]
    async fn delete_refuses_referenced_parent() {
        let gateway = InMemoryGateway::new().with_reference("sales", "subscriber_id", "subscribers");
        gateway.seed("subscribers", vec![record(json!({"id": "m1"}))]);
        gateway.seed("sales", vec![record(json!({"id": "s1", "subscriber_id": "m1"}))]);

        let err = gateway
            .delete("subscribers", &"m1".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Validation);
        assert!(err.message.contains("sales.subscriber_id"));
        assert_eq!(gateway.rows("subscribers").len(), 1);

        gateway.delete("sales", &"s1".to_string()).await.unwrap();
        gateway.delete("subscribers", &"m1".to_string()).await.unwrap();
        assert!(gateway.rows("subscribers").is_empty());
    }

    #[tokio::test]
    async fn failure_injection() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(GatewayError::network("reset"));

        assert!(gateway.select("groups").await.is_err());
        assert!(gateway.select("groups").await.is_ok());

        gateway.fail_record("groups", "g1", GatewayError::validation("bad"));
        assert!(gateway.insert("groups", &record(json!({"id": "g1"}))).await.is_err());
        assert!(gateway.insert("groups", &record(json!({"id": "g2"}))).await.is_ok());

        gateway.set_reachable(false);
        let err = gateway.select("groups").await.unwrap_err();
        assert!(err.is_transient());

        assert_eq!(gateway.calls().len(), 5);
    }
}
