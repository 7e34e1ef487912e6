/// Composite termination predicate for the conversation loop.
///
/// Evaluated after every appended message. Rules run in a fixed order and
/// the first match wins; evaluation is deterministic and side-effect free,
/// so re-running it on the same state yields the same answer.
use crate::domain::models::{Config, ConversationState, CostScope, TerminationOutcome};

pub struct TerminationEvaluator {
    max_rounds: u64,
    per_session_cost_limit: f64,
    daily_cost_threshold: f64,
    max_errors: usize,
    stall_window: usize,
}

impl TerminationEvaluator {
    pub fn new(
        max_rounds: u64,
        per_session_cost_limit: f64,
        daily_cost_threshold: f64,
        max_errors: usize,
        stall_window: usize,
    ) -> Self {
        Self {
            max_rounds,
            per_session_cost_limit,
            daily_cost_threshold,
            max_errors,
            stall_window,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_rounds,
            config.per_session_cost_limit,
            config.daily_cost_threshold,
            config.termination.max_errors,
            config.termination.stall_window,
        )
    }

    /// Decide whether the conversation must stop, and why.
    ///
    /// Rule order (first match wins): round bound, session cost, daily cost,
    /// goal declaration, unrecoverable failure, external cancellation.
    pub fn evaluate(
        &self,
        state: &ConversationState,
        daily_total: f64,
        cancelled: bool,
    ) -> Option<TerminationOutcome> {
        if state.round_count >= self.max_rounds {
            return Some(TerminationOutcome::MaxRoundsReached);
        }

        if state.cumulative_cost >= self.per_session_cost_limit {
            return Some(TerminationOutcome::CostThresholdExceeded {
                scope: CostScope::Session,
            });
        }

        if daily_total >= self.daily_cost_threshold {
            return Some(TerminationOutcome::CostThresholdExceeded {
                scope: CostScope::Daily,
            });
        }

        if let Some(last) = state.last_message() {
            if !last.is_error && last.declares_goal_satisfied() {
                return Some(TerminationOutcome::GoalSatisfied);
            }

            if last.is_error && state.trailing_error_count() >= self.max_errors {
                return Some(TerminationOutcome::FatalError {
                    cause: format!(
                        "{} consecutive failed agent steps",
                        state.trailing_error_count()
                    ),
                });
            }

            if state.is_stalled(self.stall_window) {
                return Some(TerminationOutcome::FatalError {
                    cause: "conversation stalled on repeated messages".to_string(),
                });
            }
        }

        if cancelled {
            return Some(TerminationOutcome::UserCancelled);
        }

        None
    }
}
