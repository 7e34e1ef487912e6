use serde::{Deserialize, Serialize};

/// Main configuration structure for DataWise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of agent-authored rounds per conversation
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u64,

    /// Per-session cost limit in USD
    #[serde(default = "default_per_session_cost_limit")]
    pub per_session_cost_limit: f64,

    /// Daily cost threshold in USD, summed across all sessions
    #[serde(default = "default_daily_cost_threshold")]
    pub daily_cost_threshold: f64,

    /// How the next speaker is chosen when no handoff is pending
    #[serde(default)]
    pub selection_policy: SelectionPolicy,

    /// Deadline for a single agent invocation, in seconds
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// Retry policy for transient agent failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Termination tuning
    #[serde(default)]
    pub termination: TerminationConfig,

    /// Result cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Model backend configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_rounds() -> u64 {
    15
}

const fn default_per_session_cost_limit() -> f64 {
    1.0
}

const fn default_daily_cost_threshold() -> f64 {
    10.0
}

const fn default_agent_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            per_session_cost_limit: default_per_session_cost_limit(),
            daily_cost_threshold: default_daily_cost_threshold(),
            selection_policy: SelectionPolicy::default(),
            agent_timeout_secs: default_agent_timeout_secs(),
            retry: RetryConfig::default(),
            termination: TerminationConfig::default(),
            cache: CacheConfig::default(),
            model: ModelConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Selection policy applied when no explicit handoff constrains the choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Cycle through the registry in registration order
    RoundRobin,

    /// Keyword routing to the matching capability
    #[default]
    RuleBased,

    /// Ask the model backend to pick the next speaker
    ModelDriven,
}

/// Retry policy for transient agent failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum retry attempts per invocation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff delay cap in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Termination tuning beyond the round and cost bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TerminationConfig {
    /// Consecutive error messages tolerated before the run is declared fatal
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    /// Window of identical trailing messages treated as a stalled conversation
    #[serde(default = "default_stall_window")]
    pub stall_window: usize,
}

const fn default_max_errors() -> usize {
    3
}

const fn default_stall_window() -> usize {
    3
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
            stall_window: default_stall_window(),
        }
    }
}

/// Behavior when a second caller requests a fingerprint already in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflightPolicy {
    /// Wait for the in-flight run and reuse its result
    #[default]
    Wait,

    /// Run independently (still recorded, never silent duplication)
    Proceed,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default)]
    pub on_inflight: InflightPolicy,
}

const fn default_cache_enabled() -> bool {
    true
}

const fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            on_inflight: InflightPolicy::default(),
        }
    }
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// Chat-completions endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier used for generation and pricing
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

const fn default_temperature() -> f64 {
    0.7
}

const fn default_max_tokens() -> u32 {
    4000
}

const fn default_model_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".datawise/datawise.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
