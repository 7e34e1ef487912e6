//! DataWise - Multi-Agent Conversation Orchestrator
//!
//! DataWise coordinates a team of specialized AI agents (planner, code
//! executor, visualizer, statistician) through a bounded, turn-based
//! conversation to answer a natural-language data query. The crate's core is
//! the deterministic scheduler around those non-deterministic agents:
//! next-speaker selection, termination evaluation, the handoff protocol,
//! session persistence, result caching, and cost accounting.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure data models, ports, and errors
//! - **Service Layer** (`services`): Scheduling, termination, accounting,
//!   and the conversation loop
//! - **Adapters** (`adapters`): SQLite persistence and model backends
//! - **Infrastructure** (`infrastructure`): Configuration, logging, validation
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use datawise::services::{ConversationRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire an Orchestrator with a backend and run a conversation.
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::OrchestratorError;
pub use domain::models::{
    AgentProfile, AgentRegistry, Capability, Config, ConversationState, DataRef, Fingerprint,
    Message, SelectionPolicy, TerminationOutcome, UsageDelta,
};
pub use domain::ports::{CodeRunner, ModelBackend, SessionRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConversationRequest, Orchestrator, RunResult, RunState, RunStatus};
