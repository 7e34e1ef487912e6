//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use datawise::adapters::backends::{MockCodeRunner, MockModelBackend};
use datawise::adapters::sqlite::{
    all_migrations, create_test_pool, Migrator, SqliteCacheRepository, SqliteSessionRepository,
    SqliteUsageRepository,
};
use datawise::domain::models::{AgentProfile, AgentRegistry, Capability, Config};
use datawise::services::{CacheService, CostTracker, Orchestrator, SessionService};
use sqlx::SqlitePool;

/// Create an in-memory SQLite database with migrations applied.
///
/// Each call creates a completely isolated database instance.
pub async fn setup_test_db() -> SqlitePool {
    let pool = create_test_pool()
        .await
        .expect("failed to create test database");

    Migrator::new(pool.clone())
        .run_embedded_migrations(all_migrations())
        .await
        .expect("failed to run migrations");

    pool
}

/// Fixture wiring the orchestrator over mocks and an in-memory store.
pub struct TestHarness {
    pub pool: SqlitePool,
    pub backend: Arc<MockModelBackend>,
    pub runner: Arc<MockCodeRunner>,
    pub sessions: Arc<SessionService>,
    pub cache: Arc<CacheService>,
    pub costs: Arc<CostTracker>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Test config with fast retries so failure-path tests stay quick.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_backoff_ms = 10;
    config.retry.max_backoff_ms = 50;
    config
}

/// A three-agent planning-only registry for selection-order tests.
pub fn abc_registry() -> AgentRegistry {
    AgentRegistry::new(vec![
        AgentProfile::new("A", Capability::Planning),
        AgentProfile::new("B", Capability::Planning),
        AgentProfile::new("C", Capability::Planning),
    ])
    .expect("registry is valid")
}

pub async fn harness(config: Config, registry: AgentRegistry, backend: MockModelBackend) -> TestHarness {
    let pool = setup_test_db().await;

    let backend = Arc::new(backend);
    let runner = Arc::new(MockCodeRunner::new());
    let sessions = Arc::new(SessionService::new(Arc::new(SqliteSessionRepository::new(
        pool.clone(),
    ))));
    let cache = Arc::new(CacheService::new(
        Arc::new(SqliteCacheRepository::new(pool.clone())),
        config.cache.clone(),
    ));
    let costs = Arc::new(CostTracker::new(Arc::new(SqliteUsageRepository::new(
        pool.clone(),
    ))));

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        registry,
        Arc::clone(&backend) as Arc<dyn datawise::ModelBackend>,
        Arc::clone(&runner) as Arc<dyn datawise::CodeRunner>,
        Arc::clone(&sessions),
        Arc::clone(&cache),
        Arc::clone(&costs),
    ));

    TestHarness {
        pool,
        backend,
        runner,
        sessions,
        cache,
        costs,
        orchestrator,
    }
}
