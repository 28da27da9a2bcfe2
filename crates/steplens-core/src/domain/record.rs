//! Evaluation results.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use super::question::GroundTruth;

/// One judged metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
}

/// Metric name -> score. Empty for variants that do no judging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verdict(pub BTreeMap<String, MetricScore>);

impl Verdict {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: &str) -> Option<&MetricScore> {
        self.0.get(metric)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricScore)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Result of one successful question. Never built for a failed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question_id: String,
    pub question: String,
    pub question_type: String,
    pub ground_truth: GroundTruth,
    pub answer: String,
    pub usage: TokenUsage,
    /// Variant metrics (empty for chain-of-thought and custom)
    pub metrics: Verdict,
    pub cot_verdict: Verdict,
    pub trace_id: String,
    pub session_id: String,
    pub trace_digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage { input_tokens: 10, output_tokens: 2 };
        total += TokenUsage { input_tokens: 5, output_tokens: 0 };
        assert_eq!(total, TokenUsage { input_tokens: 15, output_tokens: 2 });
    }

    #[test]
    fn verdict_serializes_as_plain_map() {
        let mut verdict = Verdict::empty();
        verdict.0.insert(
            "overall".into(),
            MetricScore { score: 0.75, explanation: "fine".into() },
        );
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["overall"]["score"], 0.75);
    }
}
