//! Judge invocation: prompt in, typed verdict out.

pub mod prompts;

use std::collections::BTreeMap;

use serde_json::Value;
use steplens_remote::{ChatRequest, JudgeModel};
use tracing::debug;

use crate::domain::{JudgeParseError, MetricScore, Result, Verdict};
use crate::metrics::METRICS;

/// Key some judges wrap the metric map in.
pub const METRICS_WRAPPER: &str = "metrics_scores";

/// A fully rendered judge call plus the metrics its reply must contain.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeInvocation {
    pub request: ChatRequest,
    pub required_metrics: Vec<String>,
}

impl JudgeInvocation {
    pub fn new(request: ChatRequest, required: &[&str]) -> Self {
        Self {
            request,
            required_metrics: required.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Call the judge and parse its reply.
    pub async fn run(&self, judge: &dyn JudgeModel) -> Result<Verdict> {
        METRICS.inc_judge_calls();
        let reply = judge.complete(self.request.clone()).await?;
        debug!(model = %self.request.model_id, chars = reply.len(), "judge replied");
        let required: Vec<&str> = self.required_metrics.iter().map(String::as_str).collect();
        Ok(parse_verdict(&reply, &required)?)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_metric(name: &str, value: &Value) -> std::result::Result<MetricScore, JudgeParseError> {
    let score = value
        .get("score")
        .ok_or_else(|| JudgeParseError::MetricShape {
            metric: name.to_string(),
        })?;
    let number = score
        .as_f64()
        .filter(|s| (0.0..=1.0).contains(s))
        .ok_or_else(|| JudgeParseError::InvalidScore {
            metric: name.to_string(),
            detail: score.to_string(),
        })?;
    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(MetricScore {
        score: number,
        explanation,
    })
}

/// Parse a judge reply of the form `{metric: {score, explanation}}`,
/// optionally wrapped as `{"metrics_scores": {...}}`.
///
/// Every object-valued entry is validated; non-object extras are ignored
/// unless they name a required metric. Nothing is ever defaulted to zero.
pub fn parse_verdict(text: &str, required: &[&str]) -> std::result::Result<Verdict, JudgeParseError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| JudgeParseError::Malformed(e.to_string()))?;
    let mut map = match value {
        Value::Object(map) => map,
        _ => return Err(JudgeParseError::NotAnObject),
    };
    if let Some(Value::Object(inner)) = map.remove(METRICS_WRAPPER) {
        map = inner;
    }

    let mut metrics = BTreeMap::new();
    for (name, entry) in &map {
        if entry.is_object() {
            metrics.insert(name.clone(), parse_metric(name, entry)?);
        } else if required.contains(&name.as_str()) {
            return Err(JudgeParseError::MetricShape {
                metric: name.clone(),
            });
        }
    }
    if let Some(missing) = required.iter().find(|m| !metrics.contains_key(**m)) {
        return Err(JudgeParseError::MissingMetric(missing.to_string()));
    }
    Ok(Verdict(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EvalError;
    use steplens_remote::fakes::ScriptedJudge;

    const COT: &[&str] = &["helpfulness", "overall"];

    #[test]
    fn plain_map_parses() {
        let v = parse_verdict(
            r#"{"helpfulness": {"score": 0.8, "explanation": "clear"}, "overall": {"score": 1, "explanation": "good"}}"#,
            COT,
        )
        .unwrap();
        assert_eq!(v.get("overall").unwrap().score, 1.0);
        assert_eq!(v.get("helpfulness").unwrap().explanation, "clear");
    }

    #[test]
    fn wrapped_map_parses() {
        let v = parse_verdict(
            r#"{"metrics_scores": {"answer_correctness": {"score": 0.5, "explanation": "half"}}}"#,
            &["answer_correctness"],
        )
        .unwrap();
        assert_eq!(v.get("answer_correctness").unwrap().score, 0.5);
    }

    #[test]
    fn code_fence_is_tolerated() {
        let text = "```json\n{\"overall\": {\"score\": 0.2, \"explanation\": \"x\"}}\n```";
        assert!(parse_verdict(text, &["overall"]).is_ok());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse_verdict("{'overall': 1}", &["overall"]).unwrap_err();
        assert!(matches!(err, JudgeParseError::Malformed(_)));
        assert_eq!(parse_verdict("[1]", &[]).unwrap_err(), JudgeParseError::NotAnObject);
    }

    #[test]
    fn missing_required_metric_is_rejected() {
        let err = parse_verdict(r#"{"helpfulness": {"score": 0.8}}"#, COT).unwrap_err();
        assert_eq!(err, JudgeParseError::MissingMetric("overall".into()));
    }

    #[test]
    fn out_of_range_or_non_numeric_score_is_rejected() {
        let err = parse_verdict(r#"{"overall": {"score": 1.5}}"#, &["overall"]).unwrap_err();
        assert!(matches!(err, JudgeParseError::InvalidScore { .. }));
        let err = parse_verdict(r#"{"overall": {"score": "high"}}"#, &["overall"]).unwrap_err();
        assert!(matches!(err, JudgeParseError::InvalidScore { .. }));
        let err = parse_verdict(r#"{"overall": {"explanation": "no score"}}"#, &["overall"]).unwrap_err();
        assert!(matches!(err, JudgeParseError::MetricShape { .. }));
    }

    #[test]
    fn non_object_extras_are_ignored() {
        let v = parse_verdict(r#"{"overall": {"score": 0}, "note": "extra"}"#, &["overall"]).unwrap();
        assert_eq!(v.0.len(), 1);
    }

    #[tokio::test]
    async fn invocation_surfaces_parse_error() {
        let judge = ScriptedJudge::new();
        judge.push_response("not json");
        let invocation = JudgeInvocation::new(ChatRequest::new("m", "s", "u"), &["overall"]);
        let err = invocation.run(&judge).await.unwrap_err();
        assert!(matches!(err, EvalError::JudgeParse(JudgeParseError::Malformed(_))));
        assert_eq!(judge.requests()[0].model_id, "m");
    }
}
