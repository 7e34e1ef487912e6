use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource usage attributable to producing one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageDelta {
    /// Prompt tokens consumed
    pub input_tokens: u64,

    /// Completion tokens produced
    pub output_tokens: u64,

    /// Cost in USD for this message
    pub cost_usd: f64,
}

impl UsageDelta {
    pub fn new(input_tokens: u64, output_tokens: u64, cost_usd: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cost_usd,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One agent-authored turn in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic sequence index within the conversation
    pub seq: u64,

    /// Name of the agent that produced this message
    pub agent: String,

    /// Text payload
    pub content: String,

    /// References to structured results (saved charts, result files)
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Explicit transfer of next-turn control, if requested
    #[serde(default)]
    pub handoff_to: Option<String>,

    /// Producing agent declared the goal satisfied
    #[serde(default)]
    pub is_final: bool,

    /// Message records a failed agent or tooling step
    #[serde(default)]
    pub is_error: bool,

    pub timestamp: DateTime<Utc>,

    /// Tokens and cost attributable to this message
    pub usage: UsageDelta,
}

impl Message {
    pub fn new(seq: u64, agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            seq,
            agent: agent.into(),
            content: content.into(),
            artifacts: Vec::new(),
            handoff_to: None,
            is_final: false,
            is_error: false,
            timestamp: Utc::now(),
            usage: UsageDelta::default(),
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: UsageDelta) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        self.handoff_to = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    #[must_use]
    pub fn final_response(mut self) -> Self {
        self.is_final = true;
        self
    }

    #[must_use]
    pub fn error_response(mut self) -> Self {
        self.is_error = true;
        self
    }

    /// Goal markers the agents emit in their last message. Kept alongside the
    /// structured `is_final` flag so replies from backends that only speak
    /// plain text still terminate the conversation.
    pub fn declares_goal_satisfied(&self) -> bool {
        self.is_final
            || self.content.contains("TERMINATE")
            || self.content.contains("STOP")
    }
}
