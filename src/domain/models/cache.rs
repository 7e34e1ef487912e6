use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::models::{DataRef, TerminationOutcome};

/// Deterministic key for a completed conversation result.
///
/// Derived from the normalized query plus the dataset identity, so the same
/// question against the same data always maps to the same entry and a new
/// dataset version never serves a stale answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a query against an optional dataset.
    ///
    /// Normalization: trim, lowercase, collapse internal whitespace runs.
    pub fn compute(query: &str, data_ref: Option<&DataRef>) -> Self {
        let normalized = query
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"\n");
        if let Some(data) = data_ref {
            hasher.update(data.identity().as_bytes());
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A stored final result keyed by fingerprint.
///
/// Created only on successful, non-cancelled completion; never mutated in
/// place, only replaced wholesale or invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,

    /// Original (un-normalized) query, kept for inspection
    pub query: String,

    pub data_ref: Option<DataRef>,

    /// The conversation's final answer
    pub answer: String,

    pub outcome: TerminationOutcome,

    /// Total cost of the run that produced this entry
    pub cost_usd: f64,

    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        query: String,
        data_ref: Option<DataRef>,
        answer: String,
        outcome: TerminationOutcome,
        cost_usd: f64,
    ) -> Self {
        Self {
            fingerprint,
            query,
            data_ref,
            answer,
            outcome,
            cost_usd,
            created_at: Utc::now(),
        }
    }

    /// Whether this entry has outlived its time-to-live.
    pub fn is_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(ttl_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_normalizes_whitespace_and_case() {
        let a = Fingerprint::compute("Plot  Sales   by month", None);
        let b = Fingerprint::compute("plot sales by month", None);
        let c = Fingerprint::compute("  PLOT SALES BY MONTH  ", None);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_fingerprint_varies_with_data_identity() {
        let v1 = DataRef::new("sales.csv", "v1");
        let v2 = DataRef::new("sales.csv", "v2");
        let a = Fingerprint::compute("plot sales", Some(&v1));
        let b = Fingerprint::compute("plot sales", Some(&v2));
        let c = Fingerprint::compute("plot sales", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_entry_expiry() {
        let entry = CacheEntry::new(
            Fingerprint::compute("q", None),
            "q".to_string(),
            None,
            "a".to_string(),
            TerminationOutcome::GoalSatisfied,
            0.01,
        );
        let now = entry.created_at;
        assert!(!entry.is_expired(3600, now + Duration::seconds(3599)));
        assert!(entry.is_expired(3600, now + Duration::seconds(3601)));
    }
}
