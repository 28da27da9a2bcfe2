//! Snapshot of the agent under evaluation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use steplens_remote::ActionGroupSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentType {
    #[serde(rename = "SINGLE-AGENT")]
    SingleAgent,
    #[serde(rename = "MULTI-AGENT")]
    MultiAgent,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentType::SingleAgent => write!(f, "SINGLE-AGENT"),
            AgentType::MultiAgent => write!(f, "MULTI-AGENT"),
        }
    }
}

/// Fetched once before the first question and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub agent_id: String,
    pub alias_id: String,
    pub agent_name: String,
    pub version: String,
    /// Bare model id: ARN path and cross-region prefix removed
    pub model_id: String,
    pub instruction: String,
    pub description: Option<String>,
    pub action_groups: Vec<ActionGroupSummary>,
    pub agent_type: AgentType,
    /// Collaborator name -> collaboration instruction (multi-agent only)
    pub collaborators: BTreeMap<String, String>,
}

impl AgentDescriptor {
    pub fn is_multi_agent(&self) -> bool {
        self.agent_type == AgentType::MultiAgent
    }

    /// Collaboration section of the chain-of-thought prompt.
    pub fn collaboration_context(&self) -> String {
        if !self.is_multi_agent() || self.collaborators.is_empty() {
            return "None".to_string();
        }
        self.collaborators
            .iter()
            .map(|(name, instruction)| format!("{name}: {instruction}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
