/// Usage ledger port (trait) for dependency injection.
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::errors::DomainResult;
use crate::domain::models::UsageDelta;

/// One per-day row of the cost ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyUsage {
    pub day: NaiveDate,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Repository trait for the persisted daily cost ledger.
///
/// Rows accumulate additively and are keyed by calendar date; crossing a
/// day boundary starts a fresh row and leaves prior rows as archive.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Adds a usage delta to the given day's row, creating it if absent.
    async fn add(&self, day: NaiveDate, delta: UsageDelta) -> DomainResult<()>;

    /// Total accumulated usage for one day, zero if no row exists.
    async fn day_total(&self, day: NaiveDate) -> DomainResult<DailyUsage>;

    /// All archived rows, most recent first.
    async fn history(&self, limit: usize) -> DomainResult<Vec<DailyUsage>>;
}
