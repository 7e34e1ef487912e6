//! SQLite implementation of the UsageRepository.
//!
//! One row per calendar day, updated additively with an upsert. Rows are
//! never deleted; old days simply stop being written and remain as archive.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::UsageDelta;
use crate::domain::ports::{DailyUsage, UsageRepository};

#[derive(Clone)]
pub struct SqliteUsageRepository {
    pool: SqlitePool,
}

impl SqliteUsageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    day: String,
    cost_usd: f64,
    input_tokens: i64,
    output_tokens: i64,
}

impl TryFrom<UsageRow> for DailyUsage {
    type Error = OrchestratorError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        let day = row
            .day
            .parse::<NaiveDate>()
            .map_err(|e| OrchestratorError::SerializationError(e.to_string()))?;
        Ok(DailyUsage {
            day,
            cost_usd: row.cost_usd,
            input_tokens: row.input_tokens as u64,
            output_tokens: row.output_tokens as u64,
        })
    }
}

#[async_trait]
impl UsageRepository for SqliteUsageRepository {
    async fn add(&self, day: NaiveDate, delta: UsageDelta) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO usage_days (day, cost_usd, input_tokens, output_tokens, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(day) DO UPDATE SET
                   cost_usd = cost_usd + excluded.cost_usd,
                   input_tokens = input_tokens + excluded.input_tokens,
                   output_tokens = output_tokens + excluded.output_tokens,
                   updated_at = excluded.updated_at"#,
        )
        .bind(day.to_string())
        .bind(delta.cost_usd)
        .bind(delta.input_tokens as i64)
        .bind(delta.output_tokens as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn day_total(&self, day: NaiveDate) -> DomainResult<DailyUsage> {
        let row: Option<UsageRow> = sqlx::query_as(
            "SELECT day, cost_usd, input_tokens, output_tokens FROM usage_days WHERE day = ?",
        )
        .bind(day.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(DailyUsage {
                day,
                cost_usd: 0.0,
                input_tokens: 0,
                output_tokens: 0,
            }),
        }
    }

    async fn history(&self, limit: usize) -> DomainResult<Vec<DailyUsage>> {
        let rows: Vec<UsageRow> = sqlx::query_as(
            "SELECT day, cost_usd, input_tokens, output_tokens FROM usage_days
             ORDER BY day DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
