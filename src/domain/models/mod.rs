pub mod agent;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod message;

pub use agent::{AgentProfile, AgentRegistry, Capability};
pub use cache::{CacheEntry, Fingerprint};
pub use config::{
    CacheConfig, Config, DatabaseConfig, InflightPolicy, LoggingConfig, ModelConfig, RetryConfig,
    SelectionPolicy, TerminationConfig,
};
pub use conversation::{ConversationState, CostScope, DataRef, TerminationOutcome};
pub use message::{Message, UsageDelta};
