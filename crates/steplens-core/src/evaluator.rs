//! Evaluation variants.
//!
//! Every question gets a chain-of-thought verdict over its rationale
//! transcript. Retrieval and query-generation questions additionally get an
//! answer-level verdict from the evaluation model; chain-of-thought and
//! custom questions do not.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use steplens_remote::{ChatRequest, JudgeModel};

use crate::config::{JudgeConfig, QueryConfig};
use crate::domain::{AgentDescriptor, EvalError, QuestionRecord, Result, Verdict};
use crate::judge::prompts;
use crate::judge::JudgeInvocation;
use crate::retry::{retry_on_throttle, RetryPolicy};
use crate::summarize::StepSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    ChainOfThought,
    Retrieval,
    QueryGeneration,
    Custom,
}

impl EvaluationKind {
    /// Resolve a question-type tag through the configured mapping. Exact
    /// match first, then case-insensitive.
    pub fn from_tag(tag: &str, mapping: &BTreeMap<String, EvaluationKind>) -> Result<Self> {
        if let Some(kind) = mapping.get(tag) {
            return Ok(*kind);
        }
        mapping
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(tag))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| EvalError::UnknownEvaluationType(tag.to_string()))
    }

    /// Whether `<TAG>_<metric>` scores go on the run trace.
    pub fn scores_run_trace(self) -> bool {
        self != EvaluationKind::ChainOfThought
    }
}

/// Default tag mapping.
pub fn default_tag_mapping() -> BTreeMap<String, EvaluationKind> {
    BTreeMap::from([
        ("COT".to_string(), EvaluationKind::ChainOfThought),
        ("RAG".to_string(), EvaluationKind::Retrieval),
        ("TEXT2SQL".to_string(), EvaluationKind::QueryGeneration),
        ("CUSTOM".to_string(), EvaluationKind::Custom),
    ])
}

/// Inputs shared by every variant.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub question: &'a QuestionRecord,
    pub answer: &'a str,
    pub summary: &'a StepSummary,
    pub descriptor: &'a AgentDescriptor,
    pub judge: &'a JudgeConfig,
    pub query: &'a QueryConfig,
}

impl EvaluationContext<'_> {
    /// Agents that took part: the evaluated agent plus, for multi-agent
    /// compositions, every collaborator seen in the trace.
    pub fn agents_used(&self) -> BTreeSet<String> {
        let mut agents = BTreeSet::from([self.descriptor.agent_name.clone()]);
        if self.descriptor.is_multi_agent() {
            agents.extend(self.summary.collaborators.iter().cloned());
        }
        agents
    }
}

/// Both verdicts for one question plus the prompt shown to the CoT judge.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub cot: Verdict,
    /// Rendered CoT system prompt with every line trimmed
    pub cot_prompt: String,
    pub metrics: Verdict,
    pub agents_used: BTreeSet<String>,
}

/// Variant-specific side artifacts attached to the agent generation record.
pub fn artifacts(kind: EvaluationKind, summary: &StepSummary) -> Map<String, Value> {
    let mut out = Map::new();
    match kind {
        EvaluationKind::Retrieval => {
            out.insert("rag_contexts".into(), json!(summary.retrieval_contexts));
        }
        EvaluationKind::QueryGeneration => {
            out.insert("agent_query".into(), json!(summary.generated_query));
        }
        EvaluationKind::ChainOfThought | EvaluationKind::Custom => {}
    }
    out
}

fn request(judge: &JudgeConfig, model_id: &str, system: String, user: &str) -> ChatRequest {
    ChatRequest::new(model_id, system, user)
        .with_max_tokens(judge.max_tokens)
        .with_temperature(judge.temperature)
        .with_top_p(judge.top_p)
}

/// Chain-of-thought judge call for `ctx`.
pub fn cot_invocation(ctx: &EvaluationContext<'_>) -> JudgeInvocation {
    let system = prompts::chain_of_thought(
        &ctx.descriptor.instruction,
        &ctx.descriptor.collaboration_context(),
        &ctx.summary.transcript,
        ctx.answer,
    );
    JudgeInvocation::new(
        request(ctx.judge, &ctx.judge.cot_model_id, system, prompts::COT_USER_MESSAGE),
        prompts::COT_METRICS,
    )
}

/// Answer-level judge call, or `None` for variants without one.
pub fn variant_invocation(kind: EvaluationKind, ctx: &EvaluationContext<'_>) -> Result<Option<JudgeInvocation>> {
    let question = &ctx.question.question;
    let invocation = match kind {
        EvaluationKind::ChainOfThought | EvaluationKind::Custom => return Ok(None),
        EvaluationKind::Retrieval => {
            let system = prompts::retrieval(
                question,
                &ctx.summary.retrieval_contexts,
                ctx.question.ground_truth.reference_answer(),
                ctx.answer,
            );
            JudgeInvocation::new(
                request(ctx.judge, &ctx.judge.eval_model_id, system, prompts::EVALUATION_USER_MESSAGE),
                prompts::RETRIEVAL_METRICS,
            )
        }
        EvaluationKind::QueryGeneration => {
            let truth = ctx.question.ground_truth.as_query().ok_or_else(|| {
                EvalError::GroundTruthShape(format!(
                    "question {} needs a structured query ground truth",
                    ctx.question.question_id
                ))
            })?;
            let system = prompts::query_generation(
                question,
                truth,
                &ctx.summary.generated_query,
                ctx.answer,
                ctx.query.include_question_understanding,
            );
            let mut required: Vec<&str> = prompts::QUERY_METRICS.to_vec();
            if ctx.query.include_question_understanding {
                required.push(prompts::QUESTION_UNDERSTANDING);
            }
            JudgeInvocation::new(
                request(ctx.judge, &ctx.judge.eval_model_id, system, prompts::EVALUATION_USER_MESSAGE),
                &required,
            )
        }
    };
    Ok(Some(invocation))
}

/// Run every judge call `kind` needs. Each call retries on throttling under
/// `retry`.
pub async fn evaluate(
    kind: EvaluationKind,
    ctx: &EvaluationContext<'_>,
    judge: &dyn JudgeModel,
    retry: &RetryPolicy,
) -> Result<Judgement> {
    // Shape problems surface before any judge call is spent.
    let variant = variant_invocation(kind, ctx)?;

    let cot_call = cot_invocation(ctx);
    let cot = retry_on_throttle(retry, "judge", || cot_call.run(judge)).await?;
    let cot_prompt = prompts::clean_prompt_indentation(&cot_call.request.system);

    let metrics = match variant {
        Some(call) => retry_on_throttle(retry, "judge", || call.run(judge)).await?,
        None => Verdict::empty(),
    };

    Ok(Judgement {
        cot,
        cot_prompt,
        metrics,
        agents_used: ctx.agents_used(),
    })
}
