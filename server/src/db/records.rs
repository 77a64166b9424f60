//! Database operations for the records table.

use chrono::{DateTime, Utc};
use gymsync_engine::Record;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

/// A stored row from the database. `data` holds every field except `id`.
#[derive(Debug)]
pub struct StoredRecord {
    pub table_name: String,
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            table_name: row.try_get("table_name")?,
            id: row.try_get("id")?,
            data: row.try_get("data")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredRecord {
    /// Convert the database row to the flat wire record.
    pub fn to_record(&self) -> Record {
        let fields = match &self.data {
            Value::Object(map) => map.clone(),
            other => {
                tracing::warn!(table = %self.table_name, id = %self.id, "non-object row data: {}", other);
                Map::new()
            }
        };
        Record::new(self.id.clone(), fields)
    }
}

/// All rows of a table in insertion order.
pub async fn list_records(pool: &PgPool, table: &str) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT table_name, id, data, created_at, updated_at
        FROM records
        WHERE table_name = $1
        ORDER BY seq
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
}

/// Whether a row exists.
pub async fn record_exists(pool: &PgPool, table: &str, id: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS(SELECT 1 FROM records WHERE table_name = $1 AND id = $2) AS found
        "#,
    )
    .bind(table)
    .bind(id)
    .fetch_one(pool)
    .await?;
    row.try_get("found")
}

/// Some row of `table` whose `field` holds `id`, if any.
pub async fn find_referrer(
    pool: &PgPool,
    table: &str,
    field: &str,
    id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id FROM records
        WHERE table_name = $1 AND data->>$2 = $3
        LIMIT 1
        "#,
    )
    .bind(table)
    .bind(field)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(|r| r.try_get::<String, _>("id")).transpose()
}

/// Insert a row or overwrite the one with the same id.
pub async fn upsert_record(
    pool: &PgPool,
    table: &str,
    record: &Record,
) -> Result<StoredRecord, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        INSERT INTO records (table_name, id, data)
        VALUES ($1, $2, $3)
        ON CONFLICT (table_name, id) DO UPDATE SET
            data = EXCLUDED.data,
            updated_at = now()
        RETURNING table_name, id, data, created_at, updated_at
        "#,
    )
    .bind(table)
    .bind(&record.id)
    .bind(Value::Object(record.fields.clone()))
    .fetch_one(pool)
    .await
}

/// Shallow-merge `patch` into a row. `None` if the row does not exist.
pub async fn patch_record(
    pool: &PgPool,
    table: &str,
    id: &str,
    patch: &Map<String, Value>,
) -> Result<Option<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        UPDATE records
        SET data = data || $3, updated_at = now()
        WHERE table_name = $1 AND id = $2
        RETURNING table_name, id, data, created_at, updated_at
        "#,
    )
    .bind(table)
    .bind(id)
    .bind(Value::Object(patch.clone()))
    .fetch_optional(pool)
    .await
}

/// Delete a row. Returns whether it existed.
pub async fn delete_record(pool: &PgPool, table: &str, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM records
        WHERE table_name = $1 AND id = $2
        "#,
    )
    .bind(table)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(data: Value) -> StoredRecord {
        StoredRecord {
            table_name: "subscribers".into(),
            id: "m1".into(),
            data,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn to_record_is_flat() {
        let record = stored(json!({"name": "Ali", "plan": "monthly"})).to_record();
        assert_eq!(
            record.to_value(),
            json!({"id": "m1", "name": "Ali", "plan": "monthly"})
        );
    }

    #[test]
    fn to_record_tolerates_bad_data() {
        let record = stored(json!([1, 2])).to_record();
        assert_eq!(record.to_value(), json!({"id": "m1"}));
    }
}
