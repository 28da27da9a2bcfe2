//! Agent descriptor extraction.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use steplens_remote::{AgentRuntime, RemoteError};
use tracing::info;

use crate::domain::{AgentDescriptor, AgentType, Result};

/// Cross-region inference-profile prefixes.
static REGION_PREFIX: OnceLock<Regex> = OnceLock::new();

fn region_prefix() -> &'static Regex {
    REGION_PREFIX.get_or_init(|| {
        Regex::new(r"^(us|us-gov|eu|apac|ca|jp|au|global)\.").expect("region prefix pattern is valid")
    })
}

/// Model id from a foundation-model ARN or id: last path segment, without
/// a cross-region routing prefix.
pub fn bare_model_id(foundation_model: &str) -> String {
    let last = foundation_model.rsplit('/').next().unwrap_or(foundation_model);
    region_prefix().replace(last, "").into_owned()
}

/// Fetch the read-only snapshot of the agent behind `alias_id`.
pub async fn fetch_descriptor(
    runtime: &dyn AgentRuntime,
    agent_id: &str,
    alias_id: &str,
) -> Result<AgentDescriptor> {
    let agent = runtime.get_agent(agent_id).await?;
    let alias = runtime.get_agent_alias(agent_id, alias_id).await?;
    let version = alias
        .routing_configuration
        .first()
        .map(|route| route.agent_version.clone())
        .ok_or_else(|| RemoteError::NotFound(format!("routing configuration for alias {alias_id}")))?;
    let details = runtime.get_agent_version(agent_id, &version).await?;
    let action_groups = runtime.list_agent_action_groups(agent_id, &version).await?;

    let agent_type = if agent.is_collaborative() {
        AgentType::MultiAgent
    } else {
        AgentType::SingleAgent
    };
    let collaborators = match agent_type {
        AgentType::MultiAgent => runtime
            .list_agent_collaborators(agent_id, &version)
            .await?
            .into_iter()
            .map(|c| (c.collaborator_name, c.collaboration_instruction))
            .collect(),
        AgentType::SingleAgent => BTreeMap::new(),
    };

    let descriptor = AgentDescriptor {
        agent_id: agent_id.to_string(),
        alias_id: alias_id.to_string(),
        agent_name: agent.agent_name,
        version,
        model_id: bare_model_id(&details.foundation_model),
        instruction: details.instruction,
        description: details.description,
        action_groups,
        agent_type,
        collaborators,
    };
    info!(
        agent_name = %descriptor.agent_name,
        version = %descriptor.version,
        model = %descriptor.model_id,
        agent_type = %descriptor.agent_type,
        "agent descriptor fetched"
    );
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use steplens_remote::fakes::ScriptedAgentRuntime;
    use steplens_remote::{AgentSummary, CollaboratorSummary};

    #[test]
    fn model_id_drops_arn_path_and_region_prefix() {
        assert_eq!(
            bare_model_id("arn:aws:bedrock:us-east-1:1:inference-profile/us.anthropic.claude-3-5-sonnet"),
            "anthropic.claude-3-5-sonnet"
        );
        assert_eq!(bare_model_id("eu.meta.llama3"), "meta.llama3");
        assert_eq!(bare_model_id("anthropic.claude-v2"), "anthropic.claude-v2");
        assert_eq!(bare_model_id("usx.model"), "usx.model");
    }

    #[test]
    fn region_prefix_is_compiled_once() {
        assert!(std::ptr::eq(region_prefix(), region_prefix()));
        assert_eq!(bare_model_id("us-gov.amazon.titan"), "amazon.titan");
        assert_eq!(bare_model_id("global.anthropic.claude"), "anthropic.claude");
    }

    #[tokio::test]
    async fn single_agent_descriptor() {
        let runtime = ScriptedAgentRuntime::new();
        let d = fetch_descriptor(&runtime, "AGENT1", "ALIAS1").await.unwrap();
        assert_eq!(d.agent_type, AgentType::SingleAgent);
        assert_eq!(d.version, "1");
        assert_eq!(d.model_id, "anthropic.claude-3-5-sonnet");
        assert!(d.collaborators.is_empty());
    }

    #[tokio::test]
    async fn multi_agent_descriptor_lists_collaborators() {
        let runtime = ScriptedAgentRuntime::new()
            .with_agent(AgentSummary {
                agent_id: "AGENT1".into(),
                agent_name: "supervisor".into(),
                agent_collaboration: "SUPERVISOR".into(),
            })
            .with_collaborators(vec![CollaboratorSummary {
                collaborator_name: "sql-agent".into(),
                collaboration_instruction: "database questions".into(),
            }]);
        let d = fetch_descriptor(&runtime, "AGENT1", "ALIAS1").await.unwrap();
        assert!(d.is_multi_agent());
        assert_eq!(d.collaborators["sql-agent"], "database questions");
    }

    #[tokio::test]
    async fn unknown_alias_fails() {
        let runtime = ScriptedAgentRuntime::new();
        assert!(fetch_descriptor(&runtime, "AGENT1", "OTHER").await.is_err());
    }
}
