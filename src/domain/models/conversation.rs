/// Domain model for conversation state.
///
/// A conversation is an append-only, totally ordered log of agent turns plus
/// the bookkeeping the scheduler needs: round count, cumulative cost, the
/// pending explicit handoff, and the terminal outcome once one is reached.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{AgentRegistry, Message};

/// Why a finished conversation stopped. Exactly one outcome is attached to a
/// finished conversation; once set, no further messages may be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationOutcome {
    MaxRoundsReached,
    GoalSatisfied,
    CostThresholdExceeded { scope: CostScope },
    FatalError { cause: String },
    UserCancelled,
}

/// Which budget a cost termination crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostScope {
    Session,
    Daily,
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxRoundsReached => write!(f, "max rounds reached"),
            Self::GoalSatisfied => write!(f, "goal satisfied"),
            Self::CostThresholdExceeded {
                scope: CostScope::Session,
            } => write!(f, "session cost limit exceeded"),
            Self::CostThresholdExceeded {
                scope: CostScope::Daily,
            } => write!(f, "daily cost threshold exceeded"),
            Self::FatalError { cause } => write!(f, "fatal error: {cause}"),
            Self::UserCancelled => write!(f, "cancelled by user"),
        }
    }
}

impl TerminationOutcome {
    /// Successful completions populate the cache; everything else does not.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::GoalSatisfied)
    }
}

/// Identity of the dataset a query runs against. Included in the cache
/// fingerprint so a changed dataset never serves a stale answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    /// Dataset name (e.g. uploaded file name)
    pub name: String,

    /// Version discriminator (content hash, upload id, or mtime)
    pub version: String,
}

impl DataRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Full state of one conversation, persisted as a snapshot between runs.
///
/// Invariants, maintained by `append_message`:
/// - `round_count == messages.len()`
/// - `cumulative_cost == Σ messages[i].usage.cost_usd`
/// - messages are never reordered; `seq` is the insertion index
/// - once `outcome` is set the state is terminal and rejects appends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,

    /// The natural-language query this conversation answers
    pub query: String,

    /// Dataset the query runs against, if any
    pub data_ref: Option<DataRef>,

    /// Ordered turn log (insertion order = causal order)
    pub messages: Vec<Message>,

    /// Number of agent-authored messages
    pub round_count: u64,

    /// Sum of per-message usage cost
    pub cumulative_cost: f64,

    /// Explicit handoff constraining the next selection, if one is pending
    pub pending_handoff: Option<String>,

    /// Terminal outcome; `None` while the conversation may continue
    pub outcome: Option<TerminationOutcome>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(session_id: String, query: String, data_ref: Option<DataRef>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            query,
            data_ref,
            messages: Vec::new(),
            round_count: 0,
            cumulative_cost: 0.0,
            pending_handoff: None,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_with_uuid(query: String, data_ref: Option<DataRef>) -> Self {
        Self::new(Uuid::new_v4().to_string(), query, data_ref)
    }

    /// Append an agent turn, advancing round count and cumulative cost.
    ///
    /// Validates the handoff protocol against the registry: the target must
    /// be registered, must appear in the acting agent's declared handoff set,
    /// and must not be the acting agent itself. An invalid handoff is an
    /// `InvalidHandoff` error, never silently dropped.
    pub fn append_message(
        &mut self,
        message: Message,
        registry: &AgentRegistry,
    ) -> DomainResult<()> {
        if self.outcome.is_some() {
            return Err(OrchestratorError::ConversationFinished(
                self.session_id.clone(),
            ));
        }

        let acting = registry
            .get(&message.agent)
            .ok_or_else(|| OrchestratorError::InvalidSelection(message.agent.clone()))?;

        if let Some(target) = &message.handoff_to {
            if target == &acting.name {
                return Err(OrchestratorError::InvalidHandoff {
                    from: acting.name.clone(),
                    to: target.clone(),
                    reason: "self-handoff is not permitted".to_string(),
                });
            }
            if registry.get(target).is_none() {
                return Err(OrchestratorError::InvalidHandoff {
                    from: acting.name.clone(),
                    to: target.clone(),
                    reason: "target is not a registered agent".to_string(),
                });
            }
            if !acting.may_hand_off_to(target) {
                return Err(OrchestratorError::InvalidHandoff {
                    from: acting.name.clone(),
                    to: target.clone(),
                    reason: "target is not in the declared handoff set".to_string(),
                });
            }
        }

        self.pending_handoff = message.handoff_to.clone();
        self.round_count += 1;
        self.cumulative_cost += message.usage.cost_usd;
        self.messages.push(message);
        self.updated_at = Utc::now();

        debug_assert_eq!(self.round_count, self.messages.len() as u64);
        Ok(())
    }

    /// Mark the conversation terminal. Idempotent only in the sense that a
    /// second outcome is rejected; the first one sticks.
    pub fn finish(&mut self, outcome: TerminationOutcome) -> DomainResult<()> {
        if self.outcome.is_some() {
            return Err(OrchestratorError::ConversationFinished(
                self.session_id.clone(),
            ));
        }
        self.outcome = Some(outcome);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The agents' final answer: content of the last non-error message.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| !m.is_error)
            .map(|m| m.content.as_str())
    }

    /// Next message sequence index.
    pub fn next_seq(&self) -> u64 {
        self.messages.len() as u64
    }

    /// Number of consecutive error-flagged messages at the tail of the log.
    pub fn trailing_error_count(&self) -> usize {
        self.messages
            .iter()
            .rev()
            .take_while(|m| m.is_error)
            .count()
    }

    /// Whether the last `window` messages repeat the same content verbatim.
    pub fn is_stalled(&self, window: usize) -> bool {
        if window < 2 || self.messages.len() < window {
            return false;
        }
        let tail = &self.messages[self.messages.len() - window..];
        let first = &tail[0].content;
        tail.iter().all(|m| &m.content == first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::UsageDelta;

    fn registry() -> AgentRegistry {
        AgentRegistry::default_team()
    }

    fn state() -> ConversationState {
        ConversationState::new("s1".to_string(), "count the rows".to_string(), None)
    }

    #[test]
    fn test_append_maintains_invariants() {
        let registry = registry();
        let mut state = state();

        for (i, cost) in [1.2, 0.3, 2.5].iter().enumerate() {
            let msg = Message::new(state.next_seq(), "Data_Analyzer", format!("turn {i}"))
                .with_usage(UsageDelta::new(100, 50, *cost));
            state.append_message(msg, &registry).unwrap();
        }

        assert_eq!(state.round_count, 3);
        assert_eq!(state.round_count, state.messages.len() as u64);
        assert!((state.cumulative_cost - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_state_rejects_append() {
        let registry = registry();
        let mut state = state();
        state.finish(TerminationOutcome::GoalSatisfied).unwrap();

        let msg = Message::new(0, "Data_Analyzer", "late turn");
        let err = state.append_message(msg, &registry).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConversationFinished(_)));
    }

    #[test]
    fn test_second_outcome_rejected() {
        let mut state = state();
        state.finish(TerminationOutcome::MaxRoundsReached).unwrap();
        assert!(state
            .finish(TerminationOutcome::UserCancelled)
            .is_err());
        assert_eq!(state.outcome, Some(TerminationOutcome::MaxRoundsReached));
    }

    #[test]
    fn test_valid_handoff_sets_pending() {
        let registry = registry();
        let mut state = state();

        let msg = Message::new(0, "Data_Analyzer", "run this").with_handoff("Code_Executor");
        state.append_message(msg, &registry).unwrap();

        assert_eq!(state.pending_handoff.as_deref(), Some("Code_Executor"));

        // The next append replaces the pending handoff with its own.
        let msg = Message::new(1, "Code_Executor", "done");
        state.append_message(msg, &registry).unwrap();
        assert!(state.pending_handoff.is_none());
    }

    #[test]
    fn test_handoff_outside_declared_set_rejected() {
        let registry = registry();
        let mut state = state();

        // Code_Executor only declares Data_Analyzer.
        let msg = Message::new(0, "Code_Executor", "done").with_handoff("Statistics_Analyst");
        let err = state.append_message(msg, &registry).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidHandoff { .. }));
        assert_eq!(state.round_count, 0, "rejected message must not count as a round");
    }

    #[test]
    fn test_self_handoff_rejected() {
        let registry = registry();
        let mut state = state();

        let msg = Message::new(0, "Data_Analyzer", "me again").with_handoff("Data_Analyzer");
        assert!(state.append_message(msg, &registry).is_err());
    }

    #[test]
    fn test_trailing_error_count_and_stall() {
        let registry = registry();
        let mut state = state();

        for _ in 0..3 {
            let msg = Message::new(state.next_seq(), "Code_Executor", "Traceback: boom")
                .error_response();
            state.append_message(msg, &registry).unwrap();
        }

        assert_eq!(state.trailing_error_count(), 3);
        assert!(state.is_stalled(3));
        assert!(!state.is_stalled(4));
    }

    #[test]
    fn test_final_answer_skips_errors() {
        let registry = registry();
        let mut state = state();

        state
            .append_message(Message::new(0, "Data_Analyzer", "the answer is 42"), &registry)
            .unwrap();
        state
            .append_message(
                Message::new(1, "Code_Executor", "crash").error_response(),
                &registry,
            )
            .unwrap();

        assert_eq!(state.final_answer(), Some("the answer is 42"));
    }
}
