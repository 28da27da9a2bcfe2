//! Step summarizer: compact views over reconstructed steps.
//!
//! Every extractor is tolerant of missing fields; absence yields an empty
//! result, never an error.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::step::kind;
use crate::domain::ReasoningStep;

/// How the agent's generated query is recovered from its trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum QueryExtraction {
    /// Action-group output text containing `marker`; the query follows
    /// `"<marker>: "`.
    ObservationMarker {
        #[serde(default = "default_marker")]
        marker: String,
    },
    /// First parameter of the action-group invocation whose `apiPath`
    /// matches.
    ActionInput { api_path: String },
}

fn default_marker() -> String {
    "the query i used".to_string()
}

impl Default for QueryExtraction {
    fn default() -> Self {
        QueryExtraction::ObservationMarker {
            marker: default_marker(),
        }
    }
}

/// Everything the judges and reporters read from a trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub transcript: String,
    pub collaborators: BTreeSet<String>,
    pub generated_query: String,
    pub retrieval_contexts: Vec<String>,
}

pub fn summarize(steps: &[ReasoningStep], extraction: &QueryExtraction) -> StepSummary {
    StepSummary {
        transcript: rationale_transcript(steps),
        collaborators: collaborators_invoked(steps),
        generated_query: extract_generated_query(steps, extraction),
        retrieval_contexts: retrieval_contexts(steps),
    }
}

/// `"Step {n}: {text}\n"` per step with a rationale, numbered from 1 over
/// those steps only.
pub fn rationale_transcript(steps: &[ReasoningStep]) -> String {
    steps
        .iter()
        .filter_map(ReasoningStep::rationale_text)
        .enumerate()
        .map(|(i, text)| format!("Step {}: {}\n", i + 1, text))
        .collect()
}

pub fn collaborators_invoked(steps: &[ReasoningStep]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for step in steps {
        let invoked = step.lookup(
            kind::INVOCATION_INPUT,
            &["agentCollaboratorInvocationInput", "agentCollaboratorName"],
        );
        let answered = step.lookup(
            kind::OBSERVATION,
            &["agentCollaboratorInvocationOutput", "agentCollaboratorName"],
        );
        for name in [invoked, answered].into_iter().flatten() {
            if let Some(name) = name.as_str() {
                names.insert(name.to_string());
            }
        }
    }
    names
}

/// Generated query, or an empty string when none is found. The last
/// matching step wins.
pub fn extract_generated_query(steps: &[ReasoningStep], extraction: &QueryExtraction) -> String {
    let found = match extraction {
        QueryExtraction::ObservationMarker { marker } => {
            let separator = format!("{marker}: ");
            steps
                .iter()
                .filter_map(|step| {
                    step.lookup(kind::OBSERVATION, &["actionGroupInvocationOutput", "text"])
                        .and_then(Value::as_str)
                })
                .filter(|text| text.contains(marker.as_str()))
                .filter_map(|text| text.split(separator.as_str()).nth(1))
                .last()
                .map(str::to_string)
        }
        QueryExtraction::ActionInput { api_path } => steps
            .iter()
            .filter_map(|step| {
                step.lookup(kind::INVOCATION_INPUT, &["actionGroupInvocationInput"])
            })
            .filter(|input| input.get("apiPath").and_then(Value::as_str) == Some(api_path.as_str()))
            .filter_map(|input| input.pointer("/parameters/0/value").and_then(Value::as_str))
            .last()
            .map(str::to_string),
    };
    found.unwrap_or_default()
}

/// Retrieved passages in trace order, duplicates kept.
pub fn retrieval_contexts(steps: &[ReasoningStep]) -> Vec<String> {
    steps
        .iter()
        .filter_map(|step| {
            step.lookup(
                kind::OBSERVATION,
                &["knowledgeBaseLookupOutput", "retrievedReferences"],
            )
            .and_then(Value::as_array)
        })
        .flatten()
        .filter_map(|reference| reference.pointer("/content/text").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn step(payloads: Value) -> ReasoningStep {
        let mut step = ReasoningStep::default();
        if let Value::Object(map) = payloads {
            step.payloads = map;
        }
        step
    }

    #[test]
    fn transcript_skips_steps_without_rationale() {
        let steps = vec![
            step(json!({ "rationale": { "text": "x" } })),
            step(json!({})),
            step(json!({ "rationale": { "text": "y" } })),
        ];
        assert_eq!(rationale_transcript(&steps), "Step 1: x\nStep 2: y\n");
    }

    #[test]
    fn transcript_of_nothing_is_empty() {
        assert_eq!(rationale_transcript(&[]), "");
        let no_text = vec![step(json!({ "rationale": { "traceId": "t" } }))];
        assert_eq!(rationale_transcript(&no_text), "");
    }

    #[test]
    fn collaborators_from_both_directions() {
        let steps = vec![
            step(json!({ "invocationInput": { "agentCollaboratorInvocationInput": { "agentCollaboratorName": "sql-agent" } } })),
            step(json!({ "observation": { "agentCollaboratorInvocationOutput": { "agentCollaboratorName": "docs-agent" } } })),
            step(json!({ "observation": { "agentCollaboratorInvocationOutput": { "agentCollaboratorName": "sql-agent" } } })),
        ];
        let names: Vec<_> = collaborators_invoked(&steps).into_iter().collect();
        assert_eq!(names, vec!["docs-agent", "sql-agent"]);
    }

    #[test]
    fn marker_query_is_the_text_after_the_marker() {
        let steps = vec![step(json!({
            "observation": { "actionGroupInvocationOutput": { "text": "Result 1 row; the query i used: SELECT 1" } }
        }))];
        let q = extract_generated_query(&steps, &QueryExtraction::default());
        assert_eq!(q, "SELECT 1");
    }

    #[test]
    fn marker_absent_gives_empty_query() {
        let steps = vec![step(json!({
            "observation": { "actionGroupInvocationOutput": { "text": "SELECT 1 returned 1" } }
        }))];
        assert_eq!(extract_generated_query(&steps, &QueryExtraction::default()), "");
    }

    #[test]
    fn last_marker_match_wins() {
        let steps = vec![
            step(json!({ "observation": { "actionGroupInvocationOutput": { "text": "the query i used: SELECT 1" } } })),
            step(json!({ "observation": { "actionGroupInvocationOutput": { "text": "the query i used: SELECT 2" } } })),
        ];
        assert_eq!(extract_generated_query(&steps, &QueryExtraction::default()), "SELECT 2");
    }

    #[test]
    fn action_input_strategy_matches_api_path() {
        let steps = vec![
            step(json!({ "invocationInput": { "actionGroupInvocationInput": {
                "apiPath": "/other", "parameters": [{ "name": "q", "value": "nope" }] } } })),
            step(json!({ "invocationInput": { "actionGroupInvocationInput": {
                "apiPath": "/queryredshift", "parameters": [{ "name": "query", "value": "SELECT 2" }] } } })),
        ];
        let strategy = QueryExtraction::ActionInput { api_path: "/queryredshift".into() };
        assert_eq!(extract_generated_query(&steps, &strategy), "SELECT 2");
    }

    #[test]
    fn contexts_keep_order_and_duplicates() {
        let refs = json!({ "observation": { "knowledgeBaseLookupOutput": { "retrievedReferences": [
            { "content": { "text": "a" } },
            { "content": {} },
            { "content": { "text": "b" } }
        ] } } });
        let steps = vec![step(refs.clone()), step(json!({})), step(refs)];
        assert_eq!(retrieval_contexts(&steps), vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn summarize_collects_everything() {
        let mut s = ReasoningStep::open(0, Some("t".into()), Map::new());
        s.payloads.insert("rationale".into(), json!({ "text": "think" }));
        let summary = summarize(&[s], &QueryExtraction::default());
        assert_eq!(summary.transcript, "Step 1: think\n");
        assert!(summary.collaborators.is_empty());
        assert!(summary.generated_query.is_empty());
    }

    #[test]
    fn strategy_parses_from_toml() {
        let strategy: QueryExtraction =
            toml::from_str("strategy = \"action_input\"\napi_path = \"/queryredshift\"").unwrap();
        assert_eq!(strategy, QueryExtraction::ActionInput { api_path: "/queryredshift".into() });
        let default: QueryExtraction = toml::from_str("strategy = \"observation_marker\"").unwrap();
        assert_eq!(default, QueryExtraction::default());
    }
}
