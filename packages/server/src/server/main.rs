// Main entry point for API server

use std::sync::Arc;

use anyhow::{Context, Result};
use engagement_core::domains::issues::EngagementEngine;
use engagement_core::kernel::{DocumentStore, MemoryStore, PostgresStore, StreamHub};
use engagement_core::server::{build_app, spawn_stream_reaper, AppState};
use engagement_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,engagement_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Issue Engagement API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(status_policy = ?config.status_policy, "Configuration loaded");

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is not durable)");
            Arc::new(MemoryStore::new())
        }
    };

    let hub = StreamHub::with_capacity(config.stream_capacity);
    let engine = Arc::new(EngagementEngine::new(
        store.clone(),
        hub.clone(),
        config.engine_settings(),
    ));

    spawn_stream_reaper(hub, config.stream_reap_interval);

    let app = build_app(AppState::new(engine, store), &config.allowed_origins);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
