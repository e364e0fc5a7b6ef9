//! Test harness for engine and HTTP integration tests.
//!
//! Every test gets a fresh in-memory store and stream hub, so tests never
//! share state. Postgres-backed tests use `PostgresHarness`, which starts one
//! shared container on first use. `FaultyHarness` runs the engine over a
//! store that can be told to fail chosen writes.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use engagement_core::domains::issues::{EngagementEngine, EngineSettings};
use engagement_core::kernel::{
    BaseDuplicateScorer, DocumentStore, FaultInjectingStore, MemoryStore, PostgresStore,
    RetryPolicy, StreamHub,
};
use engagement_core::server::{build_app, AppState};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Settings tuned for tests: quick retries so outage tests finish fast.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        retry: RetryPolicy::new(3, std::time::Duration::from_millis(1)),
        ..EngineSettings::default()
    }
}

pub struct TestHarness {
    /// Kept concrete so tests can simulate outages.
    pub store: Arc<MemoryStore>,
    pub hub: StreamHub,
    pub engine: Arc<EngagementEngine>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::build(settings, None)
    }

    pub fn with_scorer(scorer: Arc<dyn BaseDuplicateScorer>) -> Self {
        Self::build(test_settings(), Some(scorer))
    }

    fn build(settings: EngineSettings, scorer: Option<Arc<dyn BaseDuplicateScorer>>) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let hub = StreamHub::with_capacity(64);
        let mut engine = EngagementEngine::new(store.clone(), hub.clone(), settings);
        if let Some(scorer) = scorer {
            engine = engine.with_duplicate_scorer(scorer);
        }

        Self {
            store,
            hub,
            engine: Arc::new(engine),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    /// Router wired to this harness's engine.
    pub fn app(&self) -> Router {
        build_app(AppState::new(self.engine.clone(), self.dyn_store()), &[])
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {
        // In-memory store and hub are dropped with the harness
    }
}

// =============================================================================
// Fault injection
// =============================================================================

pub struct FaultyHarness {
    pub store: Arc<FaultInjectingStore>,
    pub hub: StreamHub,
    pub engine: Arc<EngagementEngine>,
}

impl FaultyHarness {
    pub fn new() -> Self {
        init_tracing();

        let store = Arc::new(FaultInjectingStore::new());
        let hub = StreamHub::with_capacity(64);
        let engine = Arc::new(EngagementEngine::new(
            store.clone(),
            hub.clone(),
            test_settings(),
        ));

        Self { store, hub, engine }
    }
}

impl AsyncTestContext for FaultyHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {
        self.store.heal();
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Shared Postgres container, started once and reused by every test.
struct SharedPostgres {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_POSTGRES: OnceCell<SharedPostgres> = OnceCell::const_new();

impl SharedPostgres {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_POSTGRES
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared Postgres container")
            })
            .await
    }
}

pub struct PostgresHarness {
    pub pool: PgPool,
    pub store: Arc<PostgresStore>,
    pub hub: StreamHub,
    pub engine: Arc<EngagementEngine>,
}

impl PostgresHarness {
    /// Fresh pool against the shared container. Tests must use unique keys
    /// or counters since the database is shared.
    pub async fn new() -> Result<Self> {
        let infra = SharedPostgres::get().await;
        let pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        let store = Arc::new(PostgresStore::new(pool.clone()));
        let hub = StreamHub::new();
        let engine = Arc::new(EngagementEngine::new(
            store.clone(),
            hub.clone(),
            test_settings(),
        ));

        Ok(Self {
            pool,
            store,
            hub,
            engine,
        })
    }
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        Self::new()
            .await
            .expect("Failed to create Postgres test harness")
    }

    async fn teardown(self) {
        self.pool.close().await;
    }
}
