//! Table handlers - row reads and writes behind `/tables`.

use crate::catalog::Catalog;
use crate::db;
use crate::error::{AppError, Result};
use gymsync_engine::{record::patch_fields, Record};
use serde_json::{Map, Value};
use sqlx::PgPool;

/// Every row of `table`, flat.
pub async fn list_table(pool: &PgPool, catalog: &Catalog, table: &str) -> Result<Vec<Record>> {
    catalog.ensure(table)?;
    let rows = db::list_records(pool, table).await?;
    Ok(rows.iter().map(db::StoredRecord::to_record).collect())
}

/// Insert a row. An existing row with the same id is overwritten so that a
/// replayed create lands on the same state.
pub async fn insert_row(
    pool: &PgPool,
    catalog: &Catalog,
    table: &str,
    body: Value,
) -> Result<Record> {
    catalog.ensure(table)?;
    let record = Record::from_value(body)?;
    check_references(pool, catalog, table, &record.fields).await?;

    let stored = db::upsert_record(pool, table, &record).await?;
    tracing::debug!(table, id = %record.id, created_at = %stored.created_at, "row written");
    Ok(stored.to_record())
}

/// Shallow-merge a patch into an existing row.
pub async fn update_row(
    pool: &PgPool,
    catalog: &Catalog,
    table: &str,
    id: &str,
    body: Value,
) -> Result<Record> {
    catalog.ensure(table)?;
    let mut patch = patch_fields(&body)?.clone();
    patch.remove("id");
    check_references(pool, catalog, table, &patch).await?;

    let stored = db::patch_record(pool, table, id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("record not found: {table}/{id}")))?;
    tracing::debug!(table, id, updated_at = %stored.updated_at, "row updated");
    Ok(stored.to_record())
}

/// Delete a row. Deleting a missing row succeeds; deleting a row that other
/// rows still reference fails.
pub async fn delete_row(pool: &PgPool, catalog: &Catalog, table: &str, id: &str) -> Result<()> {
    catalog.ensure(table)?;
    for reference in catalog.references_to(table) {
        if let Some(child) = db::find_referrer(pool, reference.table, reference.field, id).await? {
            return Err(AppError::Validation(format!(
                "foreign key violation: {table}/{id} is referenced by {}.{} of {child}",
                reference.table, reference.field
            )));
        }
    }
    if !db::delete_record(pool, table, id).await? {
        tracing::debug!(table, id, "delete of absent row");
    }
    Ok(())
}

/// Every reference field present in `fields` must name an existing parent row.
/// A `null` reference is allowed.
async fn check_references(
    pool: &PgPool,
    catalog: &Catalog,
    table: &str,
    fields: &Map<String, Value>,
) -> Result<()> {
    for reference in catalog.references_from(table) {
        let target = match fields.get(reference.field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "{}.{} must be a string id, got {other}",
                    reference.table, reference.field
                )))
            }
        };

        if !db::record_exists(pool, reference.parent, target).await? {
            return Err(AppError::Validation(format!(
                "foreign key violation: {}.{} references missing {}/{}",
                reference.table, reference.field, reference.parent, target
            )));
        }
    }
    Ok(())
}
