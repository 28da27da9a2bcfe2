//! Harness configuration, loaded once from TOML and passed by reference.
//!
//! No environment lookups happen here; the CLI overlays secrets before
//! calling [`HarnessConfig::validate`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::evaluator::{default_tag_mapping, EvaluationKind};
use crate::reducer::ReducerConfig;
use crate::retry::RetryPolicy;
use crate::summarize::QueryExtraction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub alias_id: String,
    #[serde(default = "default_true")]
    pub enable_trace: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            token: None,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Model for answer-level judging
    pub eval_model_id: String,
    /// Model for chain-of-thought judging
    pub cot_model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            eval_model_id: String::new(),
            cot_model_id: String::new(),
            max_tokens: 2048,
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub host: String,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    pub flush_every: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            host: "https://cloud.langfuse.com".to_string(),
            public_key: None,
            secret_key: None,
            flush_every: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Pause after every question
    pub cooldown_secs: u64,
    /// Pause between consecutive step spans
    pub span_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 90,
            span_delay_ms: 1000,
        }
    }
}

impl PacingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn span_delay(&self) -> Duration {
        Duration::from_millis(self.span_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub extraction: QueryExtraction,
    pub include_question_understanding: bool,
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Question-type tag -> evaluation variant
    #[serde(default = "default_tag_mapping")]
    pub evaluators: BTreeMap<String, EvaluationKind>,
    #[serde(default)]
    pub reducer: ReducerConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl HarnessConfig {
    /// Minimal config for `agent_id`/`alias_id` with every section at its
    /// default.
    pub fn new(agent_id: &str, alias_id: &str) -> Self {
        Self {
            agent: AgentConfig {
                agent_id: agent_id.to_string(),
                alias_id: alias_id.to_string(),
                enable_trace: true,
            },
            runtime: RuntimeConfig::default(),
            judge: JudgeConfig::default(),
            sink: SinkConfig::default(),
            retry: RetryPolicy::default(),
            pacing: PacingConfig::default(),
            evaluators: default_tag_mapping(),
            reducer: ReducerConfig::default(),
            query: QueryConfig::default(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("agent.agent_id", &self.agent.agent_id),
            ("agent.alias_id", &self.agent.alias_id),
            ("judge.eval_model_id", &self.judge.eval_model_id),
            ("judge.cot_model_id", &self.judge.cot_model_id),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("{name} must not be empty")));
        }
        if self.evaluators.is_empty() {
            return Err(ConfigError::Invalid(
                "evaluators must map at least one question type".to_string(),
            ));
        }
        if self.reducer.correlation_field.is_empty() {
            return Err(ConfigError::Invalid(
                "reducer.correlation_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [agent]
        agent_id = "AGENT1"
        alias_id = "ALIAS1"

        [judge]
        eval_model_id = "anthropic.claude-3-sonnet"
        cot_model_id = "anthropic.claude-3-5-sonnet"

        [retry]
        max_retries = 5

        [pacing]
        cooldown_secs = 0

        [evaluators]
        KB = "retrieval"
        SQL = "query_generation"

        [query.extraction]
        strategy = "action_input"
        api_path = "/queryredshift"
    "#;

    #[test]
    fn parses_sections_and_keeps_defaults() {
        let config = HarnessConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.agent.agent_id, "AGENT1");
        assert!(config.agent.enable_trace);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_secs, 30);
        assert_eq!(config.pacing.cooldown(), Duration::ZERO);
        assert_eq!(config.pacing.span_delay(), Duration::from_secs(1));
        assert_eq!(config.judge.max_tokens, 2048);
        assert_eq!(config.evaluators.len(), 2);
        assert_eq!(config.evaluators["SQL"], EvaluationKind::QueryGeneration);
        assert_eq!(
            config.query.extraction,
            QueryExtraction::ActionInput { api_path: "/queryredshift".into() }
        );
        assert_eq!(config.reducer.max_depth, 64);
        config.validate().unwrap();
    }

    #[test]
    fn evaluators_default_to_standard_tags() {
        let config = HarnessConfig::from_toml_str(
            "[agent]\nagent_id = \"A\"\nalias_id = \"B\"\n",
        )
        .unwrap();
        assert_eq!(config.evaluators, default_tag_mapping());
        assert_eq!(config.query.extraction, QueryExtraction::default());
    }

    #[test]
    fn missing_agent_section_is_a_parse_error() {
        let err = HarnessConfig::from_toml_str("[judge]\neval_model_id = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_blank_ids() {
        let mut config = HarnessConfig::new("A", "B");
        config.judge.eval_model_id = "e".into();
        config.judge.cot_model_id = "c".into();
        config.validate().unwrap();

        config.agent.alias_id = " ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent.alias_id"));
    }

    #[test]
    fn validate_rejects_missing_judge_models_and_empty_mapping() {
        let mut config = HarnessConfig::new("A", "B");
        assert!(config.validate().unwrap_err().to_string().contains("judge.eval_model_id"));

        config.judge.eval_model_id = "e".into();
        config.judge.cot_model_id = "c".into();
        config.evaluators.clear();
        assert!(config.validate().unwrap_err().to_string().contains("evaluators"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steplens.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.agent.alias_id, "ALIAS1");

        let missing = HarnessConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
