//! Code runner port - interface for the sandboxed execution collaborator.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::ports::BackendError;

/// Result of executing a code snippet in the sandbox.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,

    /// Files the snippet produced (saved charts, exports)
    pub artifacts: Vec<String>,
}

impl ExecutionOutput {
    /// A non-zero exit code is a runtime failure of the snippet, not of the
    /// sandbox; it surfaces as an error-flagged message, not a backend error.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for sandboxed code-execution backends.
///
/// The execution-capability agent runs the code blocks of the previous turn
/// through this port; the orchestrator only ever sees the result as a
/// message payload.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Runner name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Execute a snippet with a deadline. Sandbox/transport failures are
    /// `BackendError`s; snippet failures are an `ExecutionOutput` with a
    /// non-zero exit code.
    async fn run(&self, snippet: &str, timeout: Duration) -> Result<ExecutionOutput, BackendError>;
}
