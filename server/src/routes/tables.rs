//! Table API routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use gymsync_engine::Record;
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{delete_row, insert_row, list_table, update_row};
use crate::AppState;

/// Create table routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tables/{table}", get(list_handler).post(insert_handler))
        .route(
            "/tables/{table}/{id}",
            patch(update_handler).delete(delete_handler),
        )
}

/// GET /tables/{table} - All rows of a table.
async fn list_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(table): Path<String>,
) -> Result<Json<Vec<Record>>> {
    let rows = list_table(&state.pool, &state.catalog, &table).await?;
    Ok(Json(rows))
}

/// POST /tables/{table} - Insert a row.
async fn insert_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(table): Path<String>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>)> {
    state.catalog.ensure(&table)?;
    let Json(body) = body?;
    let record = insert_row(&state.pool, &state.catalog, &table, body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PATCH /tables/{table}/{id} - Merge fields into a row.
async fn update_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((table, id)): Path<(String, String)>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Record>> {
    state.catalog.ensure(&table)?;
    let Json(body) = body?;
    let record = update_row(&state.pool, &state.catalog, &table, &id, body).await?;
    Ok(Json(record))
}

/// DELETE /tables/{table}/{id} - Remove a row.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((table, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    delete_row(&state.pool, &state.catalog, &table, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
