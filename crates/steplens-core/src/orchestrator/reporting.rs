//! Writes one question's results to the telemetry sink.
//!
//! Record layout per question:
//!
//! ```text
//! trace  "<TAG> - Question <id>"
//! ├── generation "Agent Generation Information"
//! ├── generation "CoT Evaluation LLM-As-Judge Generation"
//! │   ├── span "Agent Trace Step 1"
//! │   ├── ...
//! │   └── score COT_<metric>
//! └── score <TAG>_<metric>            (not for chain-of-thought questions)
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use steplens_remote::{ObservationBody, ScoreBody, SinkEvent, TelemetrySink, TraceBody, UsageDetails};
use uuid::Uuid;

use crate::config::JudgeConfig;
use crate::domain::step::kind;
use crate::domain::{AgentDescriptor, EvalError, QuestionRecord, ReasoningStep, Result, TokenUsage, Verdict};
use crate::evaluator::Judgement;
use crate::metrics::METRICS;

pub const AGENT_GENERATION_NAME: &str = "Agent Generation Information";
pub const COT_GENERATION_NAME: &str = "CoT Evaluation LLM-As-Judge Generation";
pub const COT_SCORE_PREFIX: &str = "COT_";
pub const ERROR_TAG: &str = "ERROR";

/// Name of the span for the 1-indexed step `n`.
pub fn step_span_name(n: usize) -> String {
    format!("Agent Trace Step {n}")
}

fn chat_input(system: &str, user: &str) -> Value {
    json!([
        { "role": "system", "content": system },
        { "role": "user", "content": user },
    ])
}

/// Span body for one reasoning step.
pub fn step_span(step: &ReasoningStep, trace_id: &str, parent_id: &str) -> ObservationBody {
    let output = step.payload(kind::MODEL_INVOCATION_OUTPUT);
    let now = Utc::now();
    ObservationBody {
        parent_observation_id: Some(parent_id.to_string()),
        name: Some(step_span_name(step.ordinal + 1)),
        start_time: Some(now),
        end_time: Some(now),
        input: step.payload(kind::MODEL_INVOCATION_INPUT).cloned(),
        output: Some(json!({
            "Model Raw Response": output.and_then(|o| o.get("rawResponse")),
            "Model Rationale": step.payload(kind::RATIONALE),
        })),
        metadata: Some(json!({
            "Model Output metadata": output.and_then(|o| o.get("metadata")),
            "Observation": step.payload(kind::OBSERVATION),
        })),
        ..ObservationBody::new(Uuid::new_v4().to_string(), trace_id)
    }
}

/// Sink writer bound to one run trace.
pub struct RunReporter<'a> {
    sink: &'a dyn TelemetrySink,
    trace_id: String,
    session_id: String,
    span_delay: Duration,
}

impl<'a> RunReporter<'a> {
    pub fn new(sink: &'a dyn TelemetrySink, trace_id: &str, session_id: &str, span_delay: Duration) -> Self {
        Self {
            sink,
            trace_id: trace_id.to_string(),
            session_id: session_id.to_string(),
            span_delay,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    async fn send(&self, event: SinkEvent) -> Result<()> {
        self.sink.send(event).await.map_err(EvalError::Sink)
    }

    pub async fn flush(&self) -> Result<()> {
        self.sink.flush().await.map_err(EvalError::Sink)
    }

    /// Open the run trace for `question`.
    pub async fn create_run_trace(&self, question: &QuestionRecord, descriptor: &AgentDescriptor) -> Result<()> {
        let tag = &question.question_type;
        self.send(SinkEvent::TraceUpsert(TraceBody {
            timestamp: Some(Utc::now()),
            name: Some(format!("{tag} - Question {}", question.question_id)),
            user_id: Some(descriptor.agent_id.clone()),
            session_id: Some(self.session_id.clone()),
            input: Some(Value::String(question.question.clone())),
            tags: Some(vec![
                tag.clone(),
                descriptor.model_id.clone(),
                descriptor.agent_type.to_string(),
            ]),
            ..TraceBody::new(&self.trace_id)
        }))
        .await
    }

    /// Attach ground truth, judge models, digest and answer to the run trace.
    pub async fn update_after_invocation(
        &self,
        question: &QuestionRecord,
        judge: &JudgeConfig,
        trace_digest: &str,
        answer: &str,
    ) -> Result<()> {
        let mut metadata = Map::new();
        metadata.insert("Ground Truth".into(), question.ground_truth.to_value());
        metadata.insert(
            format!("{} Evaluation Model", question.question_type),
            json!(judge.eval_model_id),
        );
        metadata.insert("Chain of Thought Evaluation Model".into(), json!(judge.cot_model_id));
        metadata.insert("Trace Digest".into(), json!(trace_digest));

        self.send(SinkEvent::TraceUpsert(TraceBody {
            metadata: Some(Value::Object(metadata)),
            output: Some(Value::String(answer.to_string())),
            ..TraceBody::new(&self.trace_id)
        }))
        .await
    }

    /// Record the agent's own generation: prompt, model, timing and usage.
    #[allow(clippy::too_many_arguments)]
    pub async fn report_agent_generation(
        &self,
        descriptor: &AgentDescriptor,
        question: &QuestionRecord,
        temperature: f32,
        started_at: DateTime<Utc>,
        metadata: Value,
        answer: &str,
        usage: TokenUsage,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.send(SinkEvent::GenerationCreate(ObservationBody {
            name: Some(AGENT_GENERATION_NAME.to_string()),
            start_time: Some(started_at),
            input: Some(chat_input(&descriptor.instruction, &question.question)),
            model: Some(descriptor.model_id.clone()),
            model_parameters: Some(json!({ "temperature": temperature })),
            metadata: Some(metadata),
            ..ObservationBody::new(&id, &self.trace_id)
        }))
        .await?;

        self.send(SinkEvent::GenerationUpdate(ObservationBody {
            end_time: Some(Utc::now()),
            output: Some(Value::String(answer.to_string())),
            usage_details: Some(UsageDetails {
                input: usage.input_tokens,
                output: usage.output_tokens,
            }),
            ..ObservationBody::new(&id, &self.trace_id)
        }))
        .await?;
        Ok(id)
    }

    /// CoT generation, one span per step beneath it, then `COT_` scores.
    ///
    /// Spans go out strictly in step order with `span_delay` between them.
    pub async fn report_cot(
        &self,
        question: &QuestionRecord,
        judgement: &Judgement,
        cot_model_id: &str,
        steps: &[ReasoningStep],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.send(SinkEvent::GenerationCreate(ObservationBody {
            name: Some(COT_GENERATION_NAME.to_string()),
            start_time: Some(Utc::now()),
            input: Some(chat_input(&judgement.cot_prompt, &question.question)),
            output: Some(serde_json::to_value(&judgement.cot)?),
            metadata: Some(json!({
                "agents_used": judgement.agents_used,
                "model_used": cot_model_id,
            })),
            model: Some(cot_model_id.to_string()),
            ..ObservationBody::new(&id, &self.trace_id)
        }))
        .await?;

        for (i, step) in steps.iter().enumerate() {
            if i > 0 && !self.span_delay.is_zero() {
                tokio::time::sleep(self.span_delay).await;
            }
            self.send(SinkEvent::SpanCreate(step_span(step, &self.trace_id, &id)))
                .await?;
            METRICS.inc_spans_emitted();
        }

        self.send(SinkEvent::GenerationUpdate(ObservationBody {
            end_time: Some(Utc::now()),
            ..ObservationBody::new(&id, &self.trace_id)
        }))
        .await?;

        self.send_scores(&judgement.cot, COT_SCORE_PREFIX, Some(&id)).await?;
        Ok(id)
    }

    /// `<TAG>_<metric>` scores on the run trace.
    pub async fn report_run_scores(&self, tag: &str, metrics: &Verdict) -> Result<()> {
        self.send_scores(metrics, &format!("{tag}_"), None).await
    }

    async fn send_scores(&self, verdict: &Verdict, prefix: &str, observation_id: Option<&str>) -> Result<()> {
        for (metric, score) in verdict.iter() {
            self.send(SinkEvent::ScoreCreate(ScoreBody {
                id: Uuid::new_v4().to_string(),
                trace_id: self.trace_id.clone(),
                observation_id: observation_id.map(str::to_string),
                name: format!("{prefix}{metric}"),
                value: score.score,
                comment: Some(score.explanation.clone()),
            }))
            .await?;
        }
        Ok(())
    }

    /// Turn the run trace into an error-tagged record.
    pub async fn report_error(&self, question: &QuestionRecord, stage: &str, error: &dyn std::fmt::Display) -> Result<()> {
        let message = format!("{stage} error: {error}");
        self.send(SinkEvent::TraceUpsert(TraceBody {
            name: Some(format!(
                "[{ERROR_TAG}] {} - Question {}",
                question.question_type, question.question_id
            )),
            metadata: Some(json!({ "errorMessage": message })),
            output: Some(json!({ "Agent Error": message })),
            tags: Some(vec![ERROR_TAG.to_string()]),
            ..TraceBody::new(&self.trace_id)
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GroundTruth, MetricScore};
    use std::collections::{BTreeMap, BTreeSet};
    use steplens_remote::fakes::MemorySink;

    fn question() -> QuestionRecord {
        QuestionRecord {
            question_id: "7".into(),
            question: "Which region sold most?".into(),
            ground_truth: GroundTruth::Text("West".into()),
            question_type: "RAG".into(),
        }
    }

    fn verdict(pairs: &[(&str, f64)]) -> Verdict {
        Verdict(
            pairs
                .iter()
                .map(|(k, v)| {
                    (
                        k.to_string(),
                        MetricScore {
                            score: *v,
                            explanation: format!("{k} explained"),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn step(ordinal: usize, rationale: &str) -> ReasoningStep {
        let mut step = ReasoningStep::open(ordinal, Some(format!("t-{ordinal}")), Map::new());
        step.payloads.insert(kind::RATIONALE.into(), json!({ "text": rationale }));
        step.payloads.insert(
            kind::MODEL_INVOCATION_OUTPUT.into(),
            json!({ "rawResponse": { "content": "raw" }, "metadata": { "usage": {} } }),
        );
        step
    }

    #[tokio::test]
    async fn error_record_carries_stage_and_tag() {
        let sink = MemorySink::new();
        let reporter = RunReporter::new(&sink, "trace-1", "session-1", Duration::ZERO);
        reporter
            .report_error(&question(), "Agent Processing", &"boom")
            .await
            .unwrap();

        let events = sink.events();
        let SinkEvent::TraceUpsert(body) = &events[0] else {
            panic!("expected trace upsert");
        };
        assert_eq!(body.name.as_deref(), Some("[ERROR] RAG - Question 7"));
        assert_eq!(body.tags.as_deref(), Some(&["ERROR".to_string()][..]));
        assert_eq!(
            body.metadata.as_ref().unwrap()["errorMessage"],
            json!("Agent Processing error: boom")
        );
    }

    #[tokio::test]
    async fn cot_spans_nest_in_order_before_scores() {
        let sink = MemorySink::new();
        let reporter = RunReporter::new(&sink, "trace-1", "session-1", Duration::ZERO);
        let judgement = Judgement {
            cot: verdict(&[("helpfulness", 0.5), ("overall", 0.75)]),
            cot_prompt: "prompt".into(),
            metrics: Verdict::empty(),
            agents_used: BTreeSet::from(["solo".to_string()]),
        };
        let steps = vec![step(0, "first"), step(1, "second")];

        let cot_id = reporter
            .report_cot(&question(), &judgement, "judge-model", &steps)
            .await
            .unwrap();

        let kinds: Vec<_> = sink.events().iter().map(SinkEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "generation-create",
                "span-create",
                "span-create",
                "generation-update",
                "score-create",
                "score-create"
            ]
        );

        let spans = sink.events_of("span-create");
        for (i, event) in spans.iter().enumerate() {
            let SinkEvent::SpanCreate(body) = event else { unreachable!() };
            assert_eq!(body.name, Some(step_span_name(i + 1)));
            assert_eq!(body.parent_observation_id.as_deref(), Some(cot_id.as_str()));
            assert_eq!(body.output.as_ref().unwrap()["Model Raw Response"], json!({ "content": "raw" }));
        }

        let scores = sink.events_of("score-create");
        let SinkEvent::ScoreCreate(score) = &scores[0] else {
            unreachable!()
        };
        assert_eq!(score.name, "COT_helpfulness");
        assert_eq!(score.observation_id.as_deref(), Some(cot_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn spans_are_paced_by_delay() {
        let sink = MemorySink::new();
        let reporter = RunReporter::new(&sink, "t", "s", Duration::from_secs(1));
        let judgement = Judgement {
            cot: Verdict::empty(),
            cot_prompt: String::new(),
            metrics: Verdict::empty(),
            agents_used: BTreeSet::new(),
        };
        let steps = vec![step(0, "a"), step(1, "b"), step(2, "c")];

        let start = tokio::time::Instant::now();
        reporter.report_cot(&question(), &judgement, "m", &steps).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn run_scores_use_tag_prefix_and_no_observation() {
        let sink = MemorySink::new();
        let reporter = RunReporter::new(&sink, "trace-1", "s", Duration::ZERO);
        reporter
            .report_run_scores("TEXT2SQL", &verdict(&[("sql_semantic_equivalence", 1.0)]))
            .await
            .unwrap();

        let events = sink.events();
        let SinkEvent::ScoreCreate(score) = &events[0] else {
            panic!("expected score");
        };
        assert_eq!(score.name, "TEXT2SQL_sql_semantic_equivalence");
        assert!(score.observation_id.is_none());
        assert_eq!(score.comment.as_deref(), Some("sql_semantic_equivalence explained"));
    }

    #[tokio::test]
    async fn sink_failure_maps_to_sink_error() {
        let sink = MemorySink::new();
        sink.fail_on("score-create");
        let reporter = RunReporter::new(&sink, "trace-1", "s", Duration::ZERO);
        let err = reporter
            .report_run_scores("RAG", &verdict(&[("faithfulness", 0.2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Sink(_)));
    }
}
