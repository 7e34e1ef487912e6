//! SQLite implementation of the CacheRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{CacheEntry, DataRef, Fingerprint, TerminationOutcome};
use crate::domain::ports::CacheRepository;

#[derive(Clone)]
pub struct SqliteCacheRepository {
    pool: SqlitePool,
}

impl SqliteCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    fingerprint: String,
    query: String,
    data_ref: Option<String>,
    answer: String,
    outcome: String,
    cost_usd: f64,
    created_at: String,
}

impl TryFrom<CacheRow> for CacheEntry {
    type Error = OrchestratorError;

    fn try_from(row: CacheRow) -> Result<Self, Self::Error> {
        let outcome: TerminationOutcome = serde_json::from_str(&row.outcome)?;
        let data_ref = row
            .data_ref
            .as_deref()
            .and_then(|s| s.rsplit_once('@'))
            .map(|(name, version)| DataRef::new(name, version));
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| OrchestratorError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(CacheEntry {
            fingerprint: Fingerprint::from(row.fingerprint),
            query: row.query,
            data_ref,
            answer: row.answer,
            outcome,
            cost_usd: row.cost_usd,
            created_at,
        })
    }
}

#[async_trait]
impl CacheRepository for SqliteCacheRepository {
    async fn get(&self, fingerprint: &Fingerprint) -> DomainResult<Option<CacheEntry>> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT * FROM cache_entries WHERE fingerprint = ?")
                .bind(fingerprint.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn put(&self, entry: &CacheEntry) -> DomainResult<()> {
        let outcome = serde_json::to_string(&entry.outcome)?;

        sqlx::query(
            r#"INSERT OR REPLACE INTO cache_entries
               (fingerprint, query, data_ref, answer, outcome, cost_usd, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.fingerprint.as_str())
        .bind(&entry.query)
        .bind(entry.data_ref.as_ref().map(|d| d.identity()))
        .bind(&entry.answer)
        .bind(outcome)
        .bind(entry.cost_usd)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> DomainResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE fingerprint = ?")
            .bind(fingerprint.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> DomainResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}
