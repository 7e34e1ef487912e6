//! Model backend port - interface for the language-model collaborator.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{AgentProfile, Message, UsageDelta};

/// Failure modes of an agent backend call.
///
/// Transient errors are retried by the orchestrator up to its retry budget;
/// fatal errors terminate the conversation immediately.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("fatal backend error: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One agent reply as produced by the backend.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    /// Text payload
    pub content: String,

    /// References to produced artifacts (chart files, result files)
    pub artifacts: Vec<String>,

    /// Explicit handoff target requested by the agent, if any
    pub handoff_to: Option<String>,

    /// Agent declared the goal satisfied
    pub is_final: bool,

    /// Reply represents an error result
    pub is_error: bool,

    /// Tokens consumed producing this reply
    pub usage: UsageDelta,
}

/// Trait for language-model backends that produce agent replies.
///
/// The orchestrator treats replies as opaque: prompt content and model
/// choice live behind this boundary.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Produce the next reply for `agent` given the full conversation history.
    async fn generate(
        &self,
        agent: &AgentProfile,
        query: &str,
        history: &[Message],
    ) -> Result<AgentReply, BackendError>;

    /// Ask the backend to pick the next speaker from `candidates`.
    ///
    /// The returned identity is raw model output; callers must validate it
    /// against the agent registry before use.
    async fn select_next(
        &self,
        history: &[Message],
        candidates: &[String],
    ) -> Result<String, BackendError>;
}
