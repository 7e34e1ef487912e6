//! Mock backends for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::models::{AgentProfile, Message, UsageDelta};
use crate::domain::ports::{
    AgentReply, BackendError, CodeRunner, ExecutionOutput, ModelBackend,
};

/// One scripted backend response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(AgentReply),
    Transient(String),
    Fatal(String),
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Reply(AgentReply {
            content: content.into(),
            usage: UsageDelta::new(100, 50, 0.001),
            ..AgentReply::default()
        })
    }

    pub fn final_text(content: impl Into<String>) -> Self {
        let Self::Reply(mut reply) = Self::text(content) else {
            unreachable!()
        };
        reply.is_final = true;
        Self::Reply(reply)
    }

    #[must_use]
    pub fn with_handoff(self, target: impl Into<String>) -> Self {
        match self {
            Self::Reply(mut reply) => {
                reply.handoff_to = Some(target.into());
                Self::Reply(reply)
            }
            other => other,
        }
    }

    #[must_use]
    pub fn with_cost(self, cost_usd: f64) -> Self {
        match self {
            Self::Reply(mut reply) => {
                reply.usage.cost_usd = cost_usd;
                Self::Reply(reply)
            }
            other => other,
        }
    }

    #[must_use]
    pub fn as_error(self) -> Self {
        match self {
            Self::Reply(mut reply) => {
                reply.is_error = true;
                Self::Reply(reply)
            }
            other => other,
        }
    }
}

/// Mock model backend with a scripted reply queue.
///
/// Replies are consumed in order; once the script runs dry the default
/// reply (a goal declaration) is returned, so unscripted conversations
/// terminate instead of looping.
pub struct MockModelBackend {
    script: Mutex<VecDeque<ScriptedReply>>,
    default_reply: ScriptedReply,
    next_speaker: Option<String>,
    transient_failures: AtomicU32,
    delay: Option<Duration>,
    generate_calls: AtomicU64,
    select_calls: AtomicU64,
}

impl MockModelBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: ScriptedReply::final_text("Mock analysis complete. TERMINATE"),
            next_speaker: None,
            transient_failures: AtomicU32::new(0),
            delay: None,
            generate_calls: AtomicU64::new(0),
            select_calls: AtomicU64::new(0),
        }
    }

    /// Queue a scripted reply.
    #[must_use]
    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    /// Replace the reply returned when the script is exhausted.
    #[must_use]
    pub fn with_default_reply(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Identity returned by `select_next`.
    #[must_use]
    pub fn with_next_speaker(mut self, name: impl Into<String>) -> Self {
        self.next_speaker = Some(name.into());
        self
    }

    /// Fail the first `n` generate calls with a transient error.
    #[must_use]
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep before answering each generate call, to exercise deadlines and
    /// cooperative cancellation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn generate_calls(&self) -> u64 {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn select_calls(&self) -> u64 {
        self.select_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockModelBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelBackend for MockModelBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        _agent: &AgentProfile,
        _query: &str,
        _history: &[Message],
    ) -> Result<AgentReply, BackendError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Transient("mock transport hiccup".to_string()));
        }

        let scripted = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());

        match scripted {
            ScriptedReply::Reply(reply) => Ok(reply),
            ScriptedReply::Transient(cause) => Err(BackendError::Transient(cause)),
            ScriptedReply::Fatal(cause) => Err(BackendError::Fatal(cause)),
        }
    }

    async fn select_next(
        &self,
        _history: &[Message],
        candidates: &[String],
    ) -> Result<String, BackendError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .next_speaker
            .clone()
            .unwrap_or_else(|| candidates[0].clone()))
    }
}

/// Mock code runner that records snippets and plays back scripted outputs.
pub struct MockCodeRunner {
    outputs: Mutex<VecDeque<ExecutionOutput>>,
    snippets: Mutex<Vec<String>>,
}

impl MockCodeRunner {
    pub fn new() -> Self {
        Self {
            outputs: Mutex::new(VecDeque::new()),
            snippets: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_output(self, output: ExecutionOutput) -> Self {
        self.outputs.lock().unwrap().push_back(output);
        self
    }

    /// Snippets the runner was asked to execute, in order.
    pub fn executed_snippets(&self) -> Vec<String> {
        self.snippets.lock().unwrap().clone()
    }
}

impl Default for MockCodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeRunner for MockCodeRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(
        &self,
        snippet: &str,
        _timeout: Duration,
    ) -> Result<ExecutionOutput, BackendError> {
        self.snippets.lock().unwrap().push(snippet.to_string());

        Ok(self.outputs.lock().unwrap().pop_front().unwrap_or(
            ExecutionOutput {
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                exit_code: 0,
                artifacts: Vec::new(),
            },
        ))
    }
}
