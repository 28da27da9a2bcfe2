//! Batch summary and its Markdown rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::EvaluationRecord;
use crate::orchestrator::reporting::COT_SCORE_PREFIX;

/// How one question ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuestionStatus {
    Succeeded,
    Failed { stage: String, error: String },
}

/// Per-question line of the batch summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub trajectory: String,
    pub question_id: String,
    pub question_type: String,
    pub trace_id: String,
    #[serde(flatten)]
    pub status: QuestionStatus,
}

/// Returned by a batch run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<QuestionResult>,
    pub records: Vec<EvaluationRecord>,
}

impl BatchSummary {
    pub fn record_success(&mut self, trajectory: &str, record: EvaluationRecord) {
        self.attempted += 1;
        self.succeeded += 1;
        self.outcomes.push(QuestionResult {
            trajectory: trajectory.to_string(),
            question_id: record.question_id.clone(),
            question_type: record.question_type.clone(),
            trace_id: record.trace_id.clone(),
            status: QuestionStatus::Succeeded,
        });
        self.records.push(record);
    }

    pub fn record_failure(
        &mut self,
        trajectory: &str,
        question_id: &str,
        question_type: &str,
        trace_id: &str,
        stage: &str,
        error: &str,
    ) {
        self.attempted += 1;
        self.failed += 1;
        self.outcomes.push(QuestionResult {
            trajectory: trajectory.to_string(),
            question_id: question_id.to_string(),
            question_type: question_type.to_string(),
            trace_id: trace_id.to_string(),
            status: QuestionStatus::Failed {
                stage: stage.to_string(),
                error: error.to_string(),
            },
        });
    }

    /// Mean score per sink score name (`COT_<metric>`, `<TAG>_<metric>`)
    /// over successful questions.
    pub fn metric_means(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for record in &self.records {
            let cot = record
                .cot_verdict
                .iter()
                .map(|(m, s)| (format!("{COT_SCORE_PREFIX}{m}"), s.score));
            let variant = record
                .metrics
                .iter()
                .map(|(m, s)| (format!("{}_{m}", record.question_type), s.score));
            for (name, score) in cot.chain(variant) {
                let entry = sums.entry(name).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(name, (sum, n))| (name, sum / n as f64))
            .collect()
    }
}

/// Render the batch summary for terminal or PR output.
pub fn render_summary_md(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str("# Evaluation Summary\n\n");
    out.push_str(&format!(
        "- attempted: {}\n- succeeded: {}\n- failed: {}\n\n",
        summary.attempted, summary.succeeded, summary.failed
    ));

    let means = summary.metric_means();
    if !means.is_empty() {
        out.push_str("## Mean Scores\n");
        out.push_str("| metric | mean |\n|---|---|\n");
        for (name, mean) in &means {
            out.push_str(&format!("| {} | {:.3} |\n", name, mean));
        }
        out.push('\n');
    }

    if !summary.outcomes.is_empty() {
        out.push_str("## Questions\n");
        for o in &summary.outcomes {
            match &o.status {
                QuestionStatus::Succeeded => out.push_str(&format!(
                    "- [{}] {} `{}`: ok (trace `{}`)\n",
                    o.question_type, o.trajectory, o.question_id, o.trace_id
                )),
                QuestionStatus::Failed { stage, error } => out.push_str(&format!(
                    "- [{}] {} `{}`: FAILED in {}: {}\n",
                    o.question_type, o.trajectory, o.question_id, stage, error
                )),
            }
        }
    }
    out
}
