use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{DomainResult, OrchestratorError};

/// Declared capability of a participating agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Planning,
    Execution,
    Visualization,
    Statistics,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Execution => write!(f, "execution"),
            Self::Visualization => write!(f, "visualization"),
            Self::Statistics => write!(f, "statistics"),
        }
    }
}

impl FromStr for Capability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "execution" => Ok(Self::Execution),
            "visualization" => Ok(Self::Visualization),
            "statistics" => Ok(Self::Statistics),
            _ => Err(anyhow::anyhow!("Invalid capability: {s}")),
        }
    }
}

/// A participant in the conversation: identity, capability, and the agents
/// it may explicitly transfer control to. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name within the registry
    pub name: String,

    /// Declared capability tag
    pub capability: Capability,

    /// Ordered list of allowed explicit handoff targets
    pub handoff_targets: Vec<String>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            handoff_targets: Vec::new(),
        }
    }

    /// Add an allowed handoff target.
    #[must_use]
    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        self.handoff_targets.push(target.into());
        self
    }

    /// Whether this agent may hand control to `target`.
    pub fn may_hand_off_to(&self, target: &str) -> bool {
        self.handoff_targets.iter().any(|t| t == target)
    }
}

/// The fixed set of agents participating in one conversation run.
///
/// Handoff sets are validated statically at registration: every target must
/// name a registered agent and no agent may target itself.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentProfile>,
}

impl AgentRegistry {
    /// Build a registry from a set of profiles, validating handoff declarations.
    pub fn new(agents: Vec<AgentProfile>) -> DomainResult<Self> {
        if agents.is_empty() {
            return Err(OrchestratorError::RegistrationFailed(
                "registry requires at least one agent".to_string(),
            ));
        }

        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(OrchestratorError::RegistrationFailed(format!(
                    "duplicate agent name: {name}"
                )));
            }
        }

        for agent in &agents {
            for target in &agent.handoff_targets {
                if target == &agent.name {
                    return Err(OrchestratorError::RegistrationFailed(format!(
                        "agent {} declares a self-handoff",
                        agent.name
                    )));
                }
                if !names.contains(&target.as_str()) {
                    return Err(OrchestratorError::RegistrationFailed(format!(
                        "agent {} declares unknown handoff target {target}",
                        agent.name
                    )));
                }
            }
        }

        Ok(Self { agents })
    }

    /// The default data-analysis team: planner, code executor, visualizer,
    /// statistician. The planner and executor hand control back and forth;
    /// specialists hand their generated code to the executor.
    pub fn default_team() -> Self {
        let agents = vec![
            AgentProfile::new("Data_Analyzer", Capability::Planning)
                .with_handoff("Code_Executor")
                .with_handoff("Statistics_Analyst")
                .with_handoff("Visualization_Specialist"),
            AgentProfile::new("Code_Executor", Capability::Execution)
                .with_handoff("Data_Analyzer"),
            AgentProfile::new("Visualization_Specialist", Capability::Visualization)
                .with_handoff("Code_Executor"),
            AgentProfile::new("Statistics_Analyst", Capability::Statistics)
                .with_handoff("Code_Executor"),
        ];
        Self::new(agents).expect("default team is statically valid")
    }

    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// First registered agent with the given capability.
    pub fn by_capability(&self, capability: Capability) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.capability == capability)
    }

    pub fn agents(&self) -> &[AgentProfile] {
        &self.agents
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_round_trip() {
        assert_eq!(Capability::Planning.to_string(), "planning");
        assert_eq!(
            "statistics".parse::<Capability>().unwrap(),
            Capability::Statistics
        );
        assert!("juggling".parse::<Capability>().is_err());
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let result = AgentRegistry::new(vec![
            AgentProfile::new("a", Capability::Planning),
            AgentProfile::new("a", Capability::Execution),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_registry_rejects_self_handoff() {
        let result = AgentRegistry::new(vec![
            AgentProfile::new("a", Capability::Planning).with_handoff("a")
        ]);
        assert!(matches!(
            result.unwrap_err(),
            OrchestratorError::RegistrationFailed(_)
        ));
    }

    #[test]
    fn test_registry_rejects_unknown_target() {
        let result = AgentRegistry::new(vec![
            AgentProfile::new("a", Capability::Planning).with_handoff("ghost")
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_team_shape() {
        let registry = AgentRegistry::default_team();
        assert_eq!(registry.len(), 4);

        let planner = registry.get("Data_Analyzer").unwrap();
        assert_eq!(planner.capability, Capability::Planning);
        assert!(planner.may_hand_off_to("Code_Executor"));
        assert!(!planner.may_hand_off_to("Data_Analyzer"));

        let executor = registry.by_capability(Capability::Execution).unwrap();
        assert_eq!(executor.name, "Code_Executor");
    }
}
