//! Domain errors for the DataWise orchestrator.

use thiserror::Error;

/// Domain-level errors that can occur while orchestrating a conversation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Selector returned an unregistered agent: {0}")]
    InvalidSelection(String),

    #[error("Invalid handoff from {from} to {to}: {reason}")]
    InvalidHandoff {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Session {0} is owned by another run")]
    SessionBusy(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Conversation {0} already has a termination outcome")]
    ConversationFinished(String),

    #[error("Transient agent error: {0}")]
    TransientAgentError(String),

    #[error("Fatal agent error: {0}")]
    FatalAgentError(String),

    #[error("No eligible agent remains in the registry")]
    NoEligibleAgent,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Agent registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Whether the orchestrator may retry the failed agent invocation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientAgentError(_))
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        OrchestratorError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::SerializationError(err.to_string())
    }
}
