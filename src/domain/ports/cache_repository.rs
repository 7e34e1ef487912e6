/// Cache repository port (trait) for dependency injection.
use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CacheEntry, Fingerprint};

/// Repository trait for persisted cache entries.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Fetches an entry by fingerprint. Expiry is the caller's concern.
    async fn get(&self, fingerprint: &Fingerprint) -> DomainResult<Option<CacheEntry>>;

    /// Stores an entry, replacing any existing one for the same fingerprint.
    async fn put(&self, entry: &CacheEntry) -> DomainResult<()>;

    /// Removes the entry for a fingerprint, if present.
    async fn delete(&self, fingerprint: &Fingerprint) -> DomainResult<()>;

    /// Removes all entries, returning how many were deleted.
    async fn clear(&self) -> DomainResult<u64>;

    /// Number of stored entries.
    async fn count(&self) -> DomainResult<u64>;
}
