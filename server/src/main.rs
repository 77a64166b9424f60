//! gymsync server - the table API that offline-first gym clients sync against.
//!
//! Serves `/tables/{table}` over HTTP for the client engine's `HttpGateway`,
//! backed by PostgreSQL.

mod auth;
mod catalog;
mod config;
mod db;
mod error;
mod handlers;
mod routes;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::Pool;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymsync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        tables = ?config.tables,
        "Starting gymsync server on {}:{}",
        config.host,
        config.port
    );
    if config.auth_secret.is_none() {
        tracing::warn!("AUTH_SECRET not set; any bearer token is accepted");
    }

    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let state = AppState {
        pool,
        catalog: Arc::new(Catalog::new(config.tables.clone())),
        config: Arc::new(config.clone()),
    };
    let app = routes::create_app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
