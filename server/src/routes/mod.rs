//! HTTP route definitions.

mod health;
mod tables;

use crate::AppState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new().merge(health::routes()).merge(tables::routes())
}

/// Build the full application with middleware and state attached.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::{Config, DEFAULT_TABLES};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    // Nothing here reaches the database; the pool never connects.
    fn app(secret: Option<&str>) -> Router {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "postgres://localhost/gymsync_test".into(),
            auth_secret: secret.map(str::to_string),
            tables: DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
        };
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let catalog = Catalog::new(config.tables.clone());
        create_app(AppState {
            pool,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        })
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let response = app(Some("s3cret"))
            .oneshot(request(Method::GET, "/health", None, ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tables"], 5);
    }

    #[tokio::test]
    async fn tables_require_a_bearer_token() {
        let response = app(None)
            .oneshot(request(Method::GET, "/tables/subscribers", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(Some("s3cret"))
            .oneshot(request(Method::GET, "/tables/subscribers", Some("guess"), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Invalid token");
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let response = app(None)
            .oneshot(request(Method::GET, "/tables/users", Some("t"), ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "unknown table: users");
    }

    #[tokio::test]
    async fn insert_without_id_is_rejected() {
        let response = app(None)
            .oneshot(request(
                Method::POST,
                "/tables/subscribers",
                Some("t"),
                r#"{"name":"Ali"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "record is missing an id");
    }

    #[tokio::test]
    async fn non_object_patch_is_rejected() {
        let response = app(None)
            .oneshot(request(Method::PATCH, "/tables/sales/s1", Some("t"), "[1,2]"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let response = app(None)
            .oneshot(request(Method::POST, "/tables/sales", Some("t"), "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
