/// Cost and token accounting across sessions and calendar days.
///
/// Per-session totals accumulate in memory for the lifetime of a run (the
/// persisted conversation snapshot carries the same number); the per-day
/// ledger is persisted through the `UsageRepository` so daily thresholds
/// survive restarts and prior days remain as archive.
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::UsageDelta;
use crate::domain::ports::{DailyUsage, UsageRepository};

/// Per-1K-token USD rates, (input, output).
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o", 0.0025, 0.01),
    ("gpt-4o-mini", 0.000_15, 0.0006),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
];

/// Rate fallback when the model is not in the table.
const DEFAULT_RATES: (f64, f64) = (0.0025, 0.01);

/// Compute the USD cost of a token usage for a model.
pub fn price(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (input_rate, output_rate) = PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .map_or(DEFAULT_RATES, |(_, i, o)| (*i, *o));

    (input_tokens as f64 / 1000.0) * input_rate + (output_tokens as f64 / 1000.0) * output_rate
}

#[derive(Debug, Clone, Copy, Default)]
struct SessionTotals {
    cost_usd: f64,
    input_tokens: u64,
    output_tokens: u64,
}

/// Tracks resource usage per session and per day.
pub struct CostTracker {
    usage_repo: Arc<dyn UsageRepository>,
    sessions: RwLock<HashMap<String, SessionTotals>>,
}

impl CostTracker {
    pub fn new(usage_repo: Arc<dyn UsageRepository>) -> Self {
        Self {
            usage_repo,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Record a usage delta against a session and today's ledger row.
    ///
    /// Recording is additive and monotonic within a session; the daily row
    /// is keyed by the current UTC date, so crossing midnight starts a fresh
    /// accumulator without touching archived rows.
    #[instrument(skip(self, delta), fields(cost = delta.cost_usd), err)]
    pub async fn record(&self, session_id: &str, delta: UsageDelta) -> DomainResult<()> {
        {
            let mut sessions = self.sessions.write().await;
            let totals = sessions.entry(session_id.to_string()).or_default();
            totals.cost_usd += delta.cost_usd;
            totals.input_tokens += delta.input_tokens;
            totals.output_tokens += delta.output_tokens;
        }

        self.usage_repo.add(Utc::now().date_naive(), delta).await
    }

    /// Running cost total for a session, zero if nothing was recorded.
    pub async fn session_total(&self, session_id: &str) -> f64 {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(0.0, |t| t.cost_usd)
    }

    /// Accumulated cost for the current UTC day across all sessions.
    pub async fn daily_total(&self) -> DomainResult<f64> {
        let today = self.usage_repo.day_total(Utc::now().date_naive()).await?;
        Ok(today.cost_usd)
    }

    /// Archived daily rows, most recent first.
    pub async fn history(&self, limit: usize) -> DomainResult<Vec<DailyUsage>> {
        self.usage_repo.history(limit).await
    }
}
