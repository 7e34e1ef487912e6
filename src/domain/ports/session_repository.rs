/// Session repository port (trait) for dependency injection.
///
/// Defines the contract for conversation snapshot storage. Services depend
/// on this trait, not concrete implementations.
use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::ConversationState;

/// Repository trait for conversation-state persistence.
///
/// Implementations must make `save` atomic: a concurrent reader observes
/// either the prior snapshot or the new one in full, never a mix.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates a new session snapshot. Fails if the ID already exists.
    async fn create(&self, state: &ConversationState) -> DomainResult<()>;

    /// Retrieves the last saved snapshot, or `None` if not found.
    async fn get(&self, session_id: &str) -> DomainResult<Option<ConversationState>>;

    /// Replaces the stored snapshot wholesale.
    async fn save(&self, state: &ConversationState) -> DomainResult<()>;

    /// Deletes a session snapshot.
    async fn delete(&self, session_id: &str) -> DomainResult<()>;

    /// Lists stored sessions, most recently updated first.
    async fn list(&self, limit: usize) -> DomainResult<Vec<ConversationState>>;

    /// Checks if a session exists.
    async fn exists(&self, session_id: &str) -> DomainResult<bool>;
}
