/// Next-speaker selection for a conversation turn.
///
/// Priority order: a pending explicit handoff always wins; otherwise the
/// configured policy applies (round-robin, keyword rules, or model-driven
/// choice validated against the registry); rule ties break toward the agent
/// that has acted least recently.
use tracing::{debug, instrument};

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{
    AgentProfile, AgentRegistry, Capability, ConversationState, SelectionPolicy,
};
use crate::domain::ports::ModelBackend;

/// Keyword routing tables for rule-based selection.
///
/// Mirrors the phrasing agents actually use: execution vocabulary routes to
/// the code executor, chart vocabulary to the visualizer, and so on.
const VISUALIZATION_KEYWORDS: &[&str] =
    &["plot", "chart", "graph", "visualize", "visualization", "show me"];
const STATISTICS_KEYWORDS: &[&str] = &[
    "correlation",
    "regression",
    "t-test",
    "anova",
    "mean",
    "median",
    "std",
    "statistical",
];
const EXECUTION_KEYWORDS: &[&str] = &["run", "execute", "error", "traceback", "install"];

/// Chooses exactly one next agent given conversation state and the registry.
///
/// Selection never mutates state; it is a pure read plus, for the
/// model-driven policy, one backend call whose result is strictly validated.
pub struct Selector {
    policy: SelectionPolicy,
}

impl Selector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Select the next acting agent.
    ///
    /// # Errors
    /// - `InvalidSelection` if the model-driven policy returns an identity
    ///   not present in the registry (immediately fatal, no lenient retry)
    /// - `NoEligibleAgent` if the registry is empty
    #[instrument(skip(self, state, registry, backend), fields(session_id = %state.session_id))]
    pub async fn select<'r>(
        &self,
        state: &ConversationState,
        registry: &'r AgentRegistry,
        backend: &dyn ModelBackend,
    ) -> DomainResult<&'r AgentProfile> {
        if registry.is_empty() {
            return Err(OrchestratorError::NoEligibleAgent);
        }

        // Explicit handoff wins unconditionally. Validity against the acting
        // agent's declared set was checked when the message was appended.
        if let Some(target) = &state.pending_handoff {
            let agent = registry
                .get(target)
                .ok_or_else(|| OrchestratorError::InvalidSelection(target.clone()))?;
            debug!(target = %agent.name, "Following explicit handoff");
            return Ok(agent);
        }

        match self.policy {
            SelectionPolicy::RoundRobin => Ok(self.round_robin(state, registry)),
            SelectionPolicy::RuleBased => Ok(self.rule_based(state, registry)),
            SelectionPolicy::ModelDriven => self.model_driven(state, registry, backend).await,
        }
    }

    /// Cycle through the registry in registration order, keyed by round count.
    fn round_robin<'r>(
        &self,
        state: &ConversationState,
        registry: &'r AgentRegistry,
    ) -> &'r AgentProfile {
        let idx = (state.round_count % registry.len() as u64) as usize;
        &registry.agents()[idx]
    }

    /// Route by keyword matching on the most recent content, falling back to
    /// the planner for general queries.
    fn rule_based<'r>(
        &self,
        state: &ConversationState,
        registry: &'r AgentRegistry,
    ) -> &'r AgentProfile {
        let content = state
            .last_message()
            .map_or_else(|| state.query.to_lowercase(), |m| m.content.to_lowercase());

        let mut matches: Vec<Capability> = Vec::new();
        if VISUALIZATION_KEYWORDS.iter().any(|k| content.contains(k)) {
            matches.push(Capability::Visualization);
        }
        if STATISTICS_KEYWORDS.iter().any(|k| content.contains(k)) {
            matches.push(Capability::Statistics);
        }
        if EXECUTION_KEYWORDS.iter().any(|k| content.contains(k)) {
            matches.push(Capability::Execution);
        }

        let candidates: Vec<&AgentProfile> = matches
            .iter()
            .filter_map(|c| registry.by_capability(*c))
            .collect();

        match candidates.len() {
            0 => registry
                .by_capability(Capability::Planning)
                .unwrap_or(&registry.agents()[0]),
            1 => candidates[0],
            // Least-recently-acted fairness keeps one busy specialist from
            // starving the others when several rules match.
            _ => candidates
                .into_iter()
                .min_by_key(|a| last_acted(state, &a.name).map_or(-1, |s| s as i64))
                .expect("candidates is non-empty"),
        }
    }

    /// Ask the backend to pick the next speaker, then validate strictly
    /// against the registry. An unregistered identity is `InvalidSelection`.
    async fn model_driven<'r>(
        &self,
        state: &ConversationState,
        registry: &'r AgentRegistry,
        backend: &dyn ModelBackend,
    ) -> DomainResult<&'r AgentProfile> {
        let candidates = registry.names();
        let choice = backend
            .select_next(&state.messages, &candidates)
            .await
            .map_err(|e| OrchestratorError::FatalAgentError(e.to_string()))?;

        registry
            .get(choice.trim())
            .ok_or(OrchestratorError::InvalidSelection(choice))
    }
}

/// Sequence index of the agent's most recent turn, `None` if it never acted.
fn last_acted(state: &ConversationState, name: &str) -> Option<u64> {
    state
        .messages
        .iter()
        .rev()
        .find(|m| m.agent == name)
        .map(|m| m.seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backends::MockModelBackend;
    use crate::domain::models::Message;

    fn state_with(query: &str) -> ConversationState {
        ConversationState::new("s1".to_string(), query.to_string(), None)
    }

    #[tokio::test]
    async fn test_round_robin_cycles_in_registry_order() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new();
        let selector = Selector::new(SelectionPolicy::RoundRobin);
        let mut state = state_with("anything");

        let mut order = Vec::new();
        for _ in 0..6 {
            let agent = selector.select(&state, &registry, &backend).await.unwrap();
            order.push(agent.name.clone());
            let msg = Message::new(state.next_seq(), agent.name.clone(), "turn");
            state.append_message(msg, &registry).unwrap();
        }

        assert_eq!(
            order,
            vec![
                "Data_Analyzer",
                "Code_Executor",
                "Visualization_Specialist",
                "Statistics_Analyst",
                "Data_Analyzer",
                "Code_Executor",
            ]
        );
    }

    #[tokio::test]
    async fn test_pending_handoff_overrides_policy() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new();
        let selector = Selector::new(SelectionPolicy::RoundRobin);
        let mut state = state_with("anything");

        let msg = Message::new(0, "Data_Analyzer", "over to stats")
            .with_handoff("Statistics_Analyst");
        state.append_message(msg, &registry).unwrap();

        let agent = selector.select(&state, &registry, &backend).await.unwrap();
        assert_eq!(agent.name, "Statistics_Analyst");
    }

    #[tokio::test]
    async fn test_rule_based_routes_visualization() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new();
        let selector = Selector::new(SelectionPolicy::RuleBased);
        let state = state_with("plot sales by month");

        let agent = selector.select(&state, &registry, &backend).await.unwrap();
        assert_eq!(agent.name, "Visualization_Specialist");
    }

    #[tokio::test]
    async fn test_rule_based_routes_statistics() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new();
        let selector = Selector::new(SelectionPolicy::RuleBased);
        let state = state_with("compute the correlation between price and volume");

        let agent = selector.select(&state, &registry, &backend).await.unwrap();
        assert_eq!(agent.name, "Statistics_Analyst");
    }

    #[tokio::test]
    async fn test_rule_based_defaults_to_planner() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new();
        let selector = Selector::new(SelectionPolicy::RuleBased);
        let state = state_with("how many rows does my file have");

        let agent = selector.select(&state, &registry, &backend).await.unwrap();
        assert_eq!(agent.name, "Data_Analyzer");
    }

    #[tokio::test]
    async fn test_rule_tie_breaks_to_least_recently_acted() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new();
        let selector = Selector::new(SelectionPolicy::RuleBased);

        // Both the visualization and statistics rules match; the statistician
        // acted more recently, so the visualizer wins the tie.
        let mut state = state_with("start");
        state
            .append_message(
                Message::new(0, "Visualization_Specialist", "drew a chart"),
                &registry,
            )
            .unwrap();
        state
            .append_message(
                Message::new(
                    1,
                    "Statistics_Analyst",
                    "now plot the regression residuals",
                ),
                &registry,
            )
            .unwrap();

        let agent = selector.select(&state, &registry, &backend).await.unwrap();
        assert_eq!(agent.name, "Visualization_Specialist");
    }

    #[tokio::test]
    async fn test_model_driven_validates_identity() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new().with_next_speaker("Not_An_Agent");
        let selector = Selector::new(SelectionPolicy::ModelDriven);
        let state = state_with("anything");

        let err = selector
            .select(&state, &registry, &backend)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSelection(_)));
    }

    #[tokio::test]
    async fn test_model_driven_accepts_registered_identity() {
        let registry = AgentRegistry::default_team();
        let backend = MockModelBackend::new().with_next_speaker("Code_Executor");
        let selector = Selector::new(SelectionPolicy::ModelDriven);
        let state = state_with("anything");

        let agent = selector.select(&state, &registry, &backend).await.unwrap();
        assert_eq!(agent.name, "Code_Executor");
    }
}
