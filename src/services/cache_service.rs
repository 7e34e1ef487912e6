/// Result cache with TTL expiry and per-fingerprint flight deduplication.
///
/// Lookup happens before any scheduling starts; entries are created only on
/// successful completion and are replaced wholesale, never mutated. While a
/// conversation for a fingerprint is in flight, a second caller for the same
/// fingerprint either waits for that run's result or proceeds independently,
/// per configuration — never two silent redundant orchestrations.
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{CacheConfig, CacheEntry, Fingerprint, InflightPolicy};
use crate::domain::ports::CacheRepository;

type FlightMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Outcome of claiming a fingerprint before a run.
pub enum FlightOutcome {
    /// A completed (possibly just-finished) result is available.
    Hit(CacheEntry),

    /// The caller owns the flight; run the conversation and drop the guard
    /// when done.
    Begin(FlightGuard),
}

/// Exclusive claim on a fingerprint for the duration of one run.
///
/// Dropping the guard releases the claim and unblocks waiters.
pub struct FlightGuard {
    tracked: Option<(OwnedMutexGuard<()>, FlightMap, String)>,
}

impl FlightGuard {
    fn tracked(guard: OwnedMutexGuard<()>, map: FlightMap, key: String) -> Self {
        Self {
            tracked: Some((guard, map, key)),
        }
    }

    /// A guard that claims nothing, used when the caller elected to proceed
    /// alongside an in-flight run.
    fn untracked() -> Self {
        Self { tracked: None }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some((guard, map, key)) = self.tracked.take() {
            map.lock()
                .expect("flight map lock poisoned")
                .remove(&key);
            drop(guard);
        }
    }
}

/// Cache statistics for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: u64,
    pub ttl_secs: u64,
}

pub struct CacheService {
    repo: Arc<dyn CacheRepository>,
    config: CacheConfig,
    in_flight: FlightMap,
}

impl CacheService {
    pub fn new(repo: Arc<dyn CacheRepository>, config: CacheConfig) -> Self {
        Self {
            repo,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a fingerprint. Expired entries are deleted and reported as a
    /// miss.
    #[instrument(skip(self), fields(fingerprint = %fingerprint), err)]
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> DomainResult<Option<CacheEntry>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let Some(entry) = self.repo.get(fingerprint).await? else {
            return Ok(None);
        };

        if entry.is_expired(self.config.ttl_secs, Utc::now()) {
            debug!(fingerprint = %fingerprint, "Evicting expired cache entry");
            self.repo.delete(fingerprint).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Claim a fingerprint for a run, deduplicating concurrent requests.
    ///
    /// Returns `Hit` when a valid entry already exists (including one that
    /// finished while this caller was waiting on the in-flight run), or
    /// `Begin` with a guard the caller must hold for the run's duration.
    pub async fn begin_flight(&self, fingerprint: &Fingerprint) -> DomainResult<FlightOutcome> {
        loop {
            if let Some(entry) = self.lookup(fingerprint).await? {
                return Ok(FlightOutcome::Hit(entry));
            }

            let gate = {
                let mut map = self.in_flight.lock().expect("flight map lock poisoned");
                map.entry(fingerprint.as_str().to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                    .clone()
            };

            match gate.clone().try_lock_owned() {
                Ok(guard) => {
                    return Ok(FlightOutcome::Begin(FlightGuard::tracked(
                        guard,
                        Arc::clone(&self.in_flight),
                        fingerprint.as_str().to_string(),
                    )));
                }
                Err(_) => match self.config.on_inflight {
                    InflightPolicy::Proceed => {
                        warn!(
                            fingerprint = %fingerprint,
                            "Fingerprint already in flight; proceeding independently"
                        );
                        return Ok(FlightOutcome::Begin(FlightGuard::untracked()));
                    }
                    InflightPolicy::Wait => {
                        debug!(fingerprint = %fingerprint, "Waiting on in-flight run");
                        drop(gate.lock_owned().await);
                        // The flight finished; re-check the cache.
                    }
                },
            }
        }
    }

    /// Store a completed result. Only successful outcomes populate the
    /// cache; anything else is a no-op.
    #[instrument(skip(self, entry), fields(fingerprint = %entry.fingerprint), err)]
    pub async fn store(&self, entry: &CacheEntry) -> DomainResult<()> {
        if !self.config.enabled || !entry.outcome.is_success() {
            return Ok(());
        }
        self.repo.put(entry).await
    }

    /// Drop the entry for one fingerprint (e.g. the underlying data changed).
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> DomainResult<()> {
        self.repo.delete(fingerprint).await
    }

    /// Drop all entries, returning how many were removed.
    pub async fn clear(&self) -> DomainResult<u64> {
        self.repo.clear().await
    }

    pub async fn stats(&self) -> DomainResult<CacheStats> {
        Ok(CacheStats {
            enabled: self.config.enabled,
            entries: self.repo.count().await?,
            ttl_secs: self.config.ttl_secs,
        })
    }
}
