/// The conversation loop: a deterministic state machine around
/// non-deterministic agent replies.
///
/// One run moves `Idle -> Running -> {Completed, Failed, Cancelled}` and the
/// terminal states are final. Within a session agents act strictly one at a
/// time; across sessions runs are independent. The loop suspends only at
/// backend and persistence awaits and never holds a lock across them.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{
    AgentProfile, AgentRegistry, CacheEntry, Capability, Config, ConversationState, DataRef,
    Fingerprint, Message, TerminationOutcome,
};
use crate::domain::ports::{AgentReply, BackendError, CodeRunner, ModelBackend};
use crate::infrastructure::validators::validate_query;
use crate::services::{
    CacheService, CostTracker, FlightOutcome, Selector, SessionService, TerminationEvaluator,
};

/// Lifecycle state of one conversation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    fn from_outcome(outcome: &TerminationOutcome) -> Self {
        match outcome {
            TerminationOutcome::GoalSatisfied => Self::Completed,
            TerminationOutcome::UserCancelled => Self::Cancelled,
            TerminationOutcome::MaxRoundsReached
            | TerminationOutcome::CostThresholdExceeded { .. }
            | TerminationOutcome::FatalError { .. } => Self::Failed,
        }
    }
}

/// Status snapshot exposed to front-ends.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub round_count: u64,
    pub cost_so_far: f64,
}

/// Result of a finished (or still pending) conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Answer(String),
    Pending,
    Error(String),
}

/// Everything a caller needs to know about one completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: String,
    pub state: RunState,
    pub outcome: TerminationOutcome,
    pub answer: Option<String>,
    pub round_count: u64,
    pub cost_usd: f64,
    pub from_cache: bool,
}

/// A conversation request as it enters the orchestrator.
#[derive(Debug, Clone)]
pub struct ConversationRequest {
    pub query: String,
    pub data_ref: Option<DataRef>,
    pub session_id: Option<String>,
}

impl ConversationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            data_ref: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_data_ref(mut self, data_ref: DataRef) -> Self {
        self.data_ref = Some(data_ref);
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

struct RunEntry {
    state: RunState,
    cancel: Arc<AtomicBool>,
    answer: Option<String>,
    error: Option<String>,
}

pub struct Orchestrator {
    config: Config,
    registry: AgentRegistry,
    backend: Arc<dyn ModelBackend>,
    code_runner: Arc<dyn CodeRunner>,
    selector: Selector,
    evaluator: TerminationEvaluator,
    sessions: Arc<SessionService>,
    cache: Arc<CacheService>,
    costs: Arc<CostTracker>,
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        registry: AgentRegistry,
        backend: Arc<dyn ModelBackend>,
        code_runner: Arc<dyn CodeRunner>,
        sessions: Arc<SessionService>,
        cache: Arc<CacheService>,
        costs: Arc<CostTracker>,
    ) -> Self {
        let selector = Selector::new(config.selection_policy);
        let evaluator = TerminationEvaluator::from_config(&config);
        Self {
            config,
            registry,
            backend,
            code_runner,
            selector,
            evaluator,
            sessions,
            cache,
            costs,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Start a conversation in the background and return its session id.
    ///
    /// Idempotent when a session id is supplied: if that session is already
    /// running, the id is returned without starting a second run.
    pub fn start_conversation(self: Arc<Self>, request: ConversationRequest) -> DomainResult<String> {
        validate_query(&request.query)?;

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let cancel = match self.register_run(&session_id) {
            Ok(cancel) => cancel,
            Err(OrchestratorError::SessionBusy(_)) => return Ok(session_id),
            Err(err) => return Err(err),
        };

        let this = Arc::clone(&self);
        let id = session_id.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_registered(&id, &request, &cancel).await {
                warn!(error = %err, "Background conversation run failed");
            }
        });

        Ok(session_id)
    }

    /// Run one conversation to completion and return the report.
    #[instrument(skip(self, request), fields(query = %request.query), err)]
    pub async fn run_conversation(&self, request: ConversationRequest) -> DomainResult<RunReport> {
        validate_query(&request.query)?;

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let cancel = self.register_run(&session_id)?;
        self.run_registered(&session_id, &request, &cancel).await
    }

    /// Drive a registered run and record its terminal state in the run table.
    async fn run_registered(
        &self,
        session_id: &str,
        request: &ConversationRequest,
        cancel: &AtomicBool,
    ) -> DomainResult<RunReport> {
        let fingerprint = Fingerprint::compute(&request.query, request.data_ref.as_ref());

        let report = self.drive(session_id, &fingerprint, request, cancel).await;

        match &report {
            Ok(report) => self.finish_run(session_id, report),
            Err(err) => self.fail_run(session_id, err),
        }
        report
    }

    /// Status of a session: live state from the run table, counters from the
    /// last saved snapshot.
    pub async fn status(&self, session_id: &str) -> DomainResult<RunStatus> {
        let live = self
            .runs
            .lock()
            .expect("run map lock poisoned")
            .get(session_id)
            .map(|e| e.state);

        match self.sessions.load(session_id).await {
            Ok(state) => Ok(RunStatus {
                state: live.unwrap_or_else(|| {
                    state
                        .outcome
                        .as_ref()
                        .map_or(RunState::Idle, RunState::from_outcome)
                }),
                round_count: state.round_count,
                cost_so_far: state.cumulative_cost,
            }),
            // Cache hits complete without ever persisting a snapshot.
            Err(OrchestratorError::SessionNotFound(_)) if live.is_some() => Ok(RunStatus {
                state: live.unwrap_or(RunState::Idle),
                round_count: 0,
                cost_so_far: 0.0,
            }),
            Err(err) => Err(err),
        }
    }

    /// Final answer, pending marker, or the error that ended the run.
    pub async fn result(&self, session_id: &str) -> DomainResult<RunResult> {
        {
            let runs = self.runs.lock().expect("run map lock poisoned");
            if let Some(entry) = runs.get(session_id) {
                return Ok(match entry.state {
                    RunState::Idle | RunState::Running => RunResult::Pending,
                    RunState::Completed => RunResult::Answer(
                        entry.answer.clone().unwrap_or_default(),
                    ),
                    RunState::Failed => RunResult::Error(
                        entry
                            .error
                            .clone()
                            .unwrap_or_else(|| "run failed".to_string()),
                    ),
                    RunState::Cancelled => {
                        RunResult::Error(TerminationOutcome::UserCancelled.to_string())
                    }
                });
            }
        }

        let state = self.sessions.load(session_id).await?;
        Ok(match &state.outcome {
            None => RunResult::Pending,
            Some(TerminationOutcome::GoalSatisfied) => {
                RunResult::Answer(state.final_answer().unwrap_or_default().to_string())
            }
            Some(outcome) => RunResult::Error(outcome.to_string()),
        })
    }

    /// Request cooperative cancellation. Takes effect at the next loop
    /// iteration; an in-flight agent call is allowed to finish or time out.
    pub fn cancel(&self, session_id: &str) -> bool {
        let runs = self.runs.lock().expect("run map lock poisoned");
        match runs.get(session_id) {
            Some(entry) if entry.state == RunState::Running => {
                entry.cancel.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    fn register_run(&self, session_id: &str) -> DomainResult<Arc<AtomicBool>> {
        let mut runs = self.runs.lock().expect("run map lock poisoned");
        if let Some(entry) = runs.get(session_id) {
            if entry.state == RunState::Running {
                return Err(OrchestratorError::SessionBusy(session_id.to_string()));
            }
        }
        let cancel = Arc::new(AtomicBool::new(false));
        runs.insert(
            session_id.to_string(),
            RunEntry {
                state: RunState::Running,
                cancel: Arc::clone(&cancel),
                answer: None,
                error: None,
            },
        );
        Ok(cancel)
    }

    fn finish_run(&self, session_id: &str, report: &RunReport) {
        let mut runs = self.runs.lock().expect("run map lock poisoned");
        if let Some(entry) = runs.get_mut(session_id) {
            entry.state = report.state;
            entry.answer = report.answer.clone();
            if report.state == RunState::Failed {
                entry.error = Some(report.outcome.to_string());
            }
        }
    }

    fn fail_run(&self, session_id: &str, err: &OrchestratorError) {
        let mut runs = self.runs.lock().expect("run map lock poisoned");
        if let Some(entry) = runs.get_mut(session_id) {
            entry.state = RunState::Failed;
            entry.error = Some(err.to_string());
        }
    }

    /// The run proper: cache claim, session lease, then the turn loop.
    async fn drive(
        &self,
        session_id: &str,
        fingerprint: &Fingerprint,
        request: &ConversationRequest,
        cancel: &AtomicBool,
    ) -> DomainResult<RunReport> {
        // Cache consultation happens before any scheduling starts. The guard
        // also deduplicates concurrent runs of the same fingerprint.
        let _flight = if self.cache.enabled() {
            match self.cache.begin_flight(fingerprint).await? {
                FlightOutcome::Hit(entry) => {
                    info!(session_id, fingerprint = %fingerprint, "Cache hit");
                    return Ok(RunReport {
                        session_id: session_id.to_string(),
                        state: RunState::Completed,
                        outcome: entry.outcome,
                        answer: Some(entry.answer),
                        round_count: 0,
                        cost_usd: 0.0,
                        from_cache: true,
                    });
                }
                FlightOutcome::Begin(guard) => Some(guard),
            }
        } else {
            None
        };

        let lease = self.sessions.acquire(session_id)?;
        let mut state = self
            .sessions
            .load_or_create(&lease, &request.query, request.data_ref.clone())
            .await?;

        // Resuming a finished session is a no-op completion.
        if let Some(outcome) = state.outcome.clone() {
            return Ok(self.report_from_state(&state, outcome, false));
        }

        let outcome = loop {
            // Cooperative cancellation and bound checks at the top of every
            // iteration, so a resumed session over budget stops immediately.
            let daily = self.costs.daily_total().await?;
            if let Some(outcome) =
                self.evaluator
                    .evaluate(&state, daily, cancel.load(Ordering::SeqCst))
            {
                break outcome;
            }

            let agent = match self
                .selector
                .select(&state, &self.registry, self.backend.as_ref())
                .await
            {
                Ok(agent) => agent,
                Err(err) => break TerminationOutcome::FatalError {
                    cause: err.to_string(),
                },
            };

            let reply = match self.invoke_with_retry(agent, &state).await {
                Ok(reply) => reply,
                Err(err) => break TerminationOutcome::FatalError {
                    cause: err.to_string(),
                },
            };

            self.costs.record(session_id, reply.usage).await?;

            let message = Message {
                seq: state.next_seq(),
                agent: agent.name.clone(),
                content: reply.content,
                artifacts: reply.artifacts,
                handoff_to: reply.handoff_to,
                is_final: reply.is_final,
                is_error: reply.is_error,
                timestamp: chrono::Utc::now(),
                usage: reply.usage,
            };

            // An invalid handoff terminates the run; it is never silently
            // replaced by default selection.
            if let Err(err) = state.append_message(message, &self.registry) {
                break TerminationOutcome::FatalError {
                    cause: err.to_string(),
                };
            }

            self.sessions.save(&state, &lease).await?;
        };

        state.finish(outcome.clone())?;
        self.sessions.save(&state, &lease).await?;

        if outcome.is_success() {
            let entry = CacheEntry::new(
                fingerprint.clone(),
                request.query.clone(),
                request.data_ref.clone(),
                state.final_answer().unwrap_or_default().to_string(),
                outcome.clone(),
                state.cumulative_cost,
            );
            self.cache.store(&entry).await?;
        }

        info!(
            session_id,
            rounds = state.round_count,
            cost = state.cumulative_cost,
            outcome = %outcome,
            "Conversation finished"
        );

        Ok(self.report_from_state(&state, outcome, false))
    }

    fn report_from_state(
        &self,
        state: &ConversationState,
        outcome: TerminationOutcome,
        from_cache: bool,
    ) -> RunReport {
        let run_state = RunState::from_outcome(&outcome);
        let answer = if outcome.is_success() {
            state.final_answer().map(ToString::to_string)
        } else {
            None
        };
        RunReport {
            session_id: state.session_id.clone(),
            state: run_state,
            outcome,
            answer,
            round_count: state.round_count,
            cost_usd: state.cumulative_cost,
            from_cache,
        }
    }

    /// Invoke one agent with deadline enforcement and retry on transient
    /// failures. Retries never count against the round bound because nothing
    /// is appended until an invocation succeeds.
    async fn invoke_with_retry(
        &self,
        agent: &AgentProfile,
        state: &ConversationState,
    ) -> DomainResult<AgentReply> {
        let max_retries = self.config.retry.max_retries;
        let initial_backoff = Duration::from_millis(self.config.retry.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.retry.max_backoff_ms);

        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            match self.invoke_once(agent, state).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    if !err.is_transient() {
                        return Err(err);
                    }
                    last_error = err.to_string();

                    if attempt < max_retries {
                        let backoff_ms =
                            initial_backoff.as_millis() * 2_u128.pow(attempt);
                        let backoff = Duration::from_millis(
                            backoff_ms.min(max_backoff.as_millis()) as u64,
                        );
                        warn!(
                            agent = %agent.name,
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis(),
                            error = %last_error,
                            "Retrying agent invocation after transient error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(OrchestratorError::FatalAgentError(format!(
            "retry budget ({max_retries}) exhausted for {}: {last_error}",
            agent.name
        )))
    }

    /// One invocation attempt under the configured deadline.
    async fn invoke_once(
        &self,
        agent: &AgentProfile,
        state: &ConversationState,
    ) -> DomainResult<AgentReply> {
        let deadline = Duration::from_secs(self.config.agent_timeout_secs);

        let attempt = async {
            if agent.capability == Capability::Execution {
                self.invoke_executor(state, deadline).await
            } else {
                self.backend
                    .generate(agent, &state.query, &state.messages)
                    .await
            }
        };

        match timeout(deadline, attempt).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(BackendError::Transient(cause))) => {
                Err(OrchestratorError::TransientAgentError(cause))
            }
            Ok(Err(BackendError::Fatal(cause))) => {
                Err(OrchestratorError::FatalAgentError(cause))
            }
            Err(_) => Err(OrchestratorError::TransientAgentError(format!(
                "agent {} exceeded its {}s deadline",
                agent.name,
                deadline.as_secs()
            ))),
        }
    }

    /// The execution agent runs the code blocks of the previous turn through
    /// the sandbox port; the orchestrator only sees the result as a message.
    async fn invoke_executor(
        &self,
        state: &ConversationState,
        deadline: Duration,
    ) -> Result<AgentReply, BackendError> {
        let snippets = state
            .last_message()
            .map(|m| extract_code_blocks(&m.content))
            .unwrap_or_default();

        if snippets.is_empty() {
            return Ok(AgentReply {
                content: "No code blocks found in the previous message.".to_string(),
                ..AgentReply::default()
            });
        }

        let mut stdout = String::new();
        let mut artifacts = Vec::new();
        for snippet in &snippets {
            let output = self.code_runner.run(snippet, deadline).await?;
            if !output.succeeded() {
                return Ok(AgentReply {
                    content: format!(
                        "Execution failed (exit code {}):\n{}",
                        output.exit_code, output.stderr
                    ),
                    is_error: true,
                    ..AgentReply::default()
                });
            }
            stdout.push_str(&output.stdout);
            artifacts.extend(output.artifacts);
        }

        Ok(AgentReply {
            content: stdout,
            artifacts,
            ..AgentReply::default()
        })
    }
}

/// Extract fenced code blocks from a message body.
fn extract_code_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(block) => blocks.push(block),
                None => current = Some(String::new()),
            }
        } else if let Some(block) = current.as_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_block() {
        let content = "Here is the code:\n```python\nprint(1)\n```\ndone";
        let blocks = extract_code_blocks(content);
        assert_eq!(blocks, vec!["print(1)\n"]);
    }

    #[test]
    fn test_extract_multiple_blocks() {
        let content = "```\na\n```\ntext\n```sh\nb\n```";
        let blocks = extract_code_blocks(content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], "b\n");
    }

    #[test]
    fn test_no_blocks() {
        assert!(extract_code_blocks("plain text only").is_empty());
    }

    #[test]
    fn test_unterminated_block_is_dropped() {
        let blocks = extract_code_blocks("```python\nprint(1)");
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_run_state_mapping() {
        assert_eq!(
            RunState::from_outcome(&TerminationOutcome::GoalSatisfied),
            RunState::Completed
        );
        assert_eq!(
            RunState::from_outcome(&TerminationOutcome::UserCancelled),
            RunState::Cancelled
        );
        assert_eq!(
            RunState::from_outcome(&TerminationOutcome::MaxRoundsReached),
            RunState::Failed
        );
    }
}
