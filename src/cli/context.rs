//! Shared CLI bootstrap: pool, migrations, services, orchestrator.

use anyhow::{Context as _, Result};
use std::sync::Arc;

use crate::adapters::backends::{OpenAiApiConfig, OpenAiBackend};
use crate::adapters::sqlite::{
    all_migrations, create_pool, Migrator, SqliteCacheRepository, SqliteSessionRepository,
    SqliteUsageRepository,
};
use crate::domain::models::{AgentRegistry, Config};
use crate::services::{CacheService, CostTracker, Orchestrator, SessionService};

/// Everything a CLI command needs, wired once.
pub struct AppContext {
    pub config: Config,
    pub sessions: Arc<SessionService>,
    pub cache: Arc<CacheService>,
    pub costs: Arc<CostTracker>,
}

impl AppContext {
    /// Open the database, apply migrations, and construct the services.
    pub async fn init(config: Config) -> Result<Self> {
        let pool = create_pool(&config.database.path, config.database.max_connections)
            .await
            .context("Failed to open the conversation store")?;

        Migrator::new(pool.clone())
            .run_embedded_migrations(all_migrations())
            .await
            .context("Failed to apply database migrations")?;

        let sessions = Arc::new(SessionService::new(Arc::new(SqliteSessionRepository::new(
            pool.clone(),
        ))));
        let cache = Arc::new(CacheService::new(
            Arc::new(SqliteCacheRepository::new(pool.clone())),
            config.cache.clone(),
        ));
        let costs = Arc::new(CostTracker::new(Arc::new(SqliteUsageRepository::new(pool))));

        Ok(Self {
            config,
            sessions,
            cache,
            costs,
        })
    }

    /// Build an orchestrator over the live OpenAI backend.
    pub fn orchestrator(&self) -> Result<Arc<Orchestrator>> {
        let backend = OpenAiBackend::new(OpenAiApiConfig::from(&self.config.model))
            .map_err(|e| anyhow::anyhow!("Failed to build model backend: {e}"))?;

        Ok(Arc::new(Orchestrator::new(
            self.config.clone(),
            AgentRegistry::default_team(),
            Arc::new(backend),
            Arc::new(UnavailableCodeRunner),
            Arc::clone(&self.sessions),
            Arc::clone(&self.cache),
            Arc::clone(&self.costs),
        )))
    }
}

/// Code runner for deployments without a sandbox attached; every execution
/// attempt surfaces as a fatal backend error.
struct UnavailableCodeRunner;

#[async_trait::async_trait]
impl crate::domain::ports::CodeRunner for UnavailableCodeRunner {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn run(
        &self,
        _snippet: &str,
        _timeout: std::time::Duration,
    ) -> Result<crate::domain::ports::ExecutionOutput, crate::domain::ports::BackendError> {
        Err(crate::domain::ports::BackendError::Fatal(
            "no code-execution sandbox is configured".to_string(),
        ))
    }
}
