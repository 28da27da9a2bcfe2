//! steplens Core Library
//!
//! Replays a hosted agent's reasoning trace, judges it with an LLM, and ships
//! the results to a telemetry sink.

pub mod config;
pub mod descriptor;
pub mod domain;
pub mod evaluator;
pub mod invoker;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod reducer;
pub mod report;
pub mod retry;
pub mod summarize;
pub mod telemetry;

pub use config::{
    AgentConfig, HarnessConfig, JudgeConfig, PacingConfig, QueryConfig, RuntimeConfig, SinkConfig,
};
pub use descriptor::{bare_model_id, fetch_descriptor};
pub use domain::{
    canonical_json, trace_digest, AgentDescriptor, AgentType, BatchInput, ConfigError, EvalError,
    EvaluationRecord, GroundTruth, JudgeParseError, MetricScore, QueryGroundTruth, QuestionRecord,
    ReasoningStep, Result, TokenUsage, Verdict,
};
pub use evaluator::{default_tag_mapping, evaluate, EvaluationContext, EvaluationKind, Judgement};
pub use invoker::{AgentInvoker, Invocation};
pub use judge::{parse_verdict, JudgeInvocation};
pub use orchestrator::{
    CancelSignal, Orchestrator, QuestionLifecycle, QuestionOutcome, QuestionState, RunReporter,
};
pub use reducer::{find_correlation_key, ReducerConfig, TraceReducer};
pub use report::{render_summary_md, BatchSummary, QuestionResult, QuestionStatus};
pub use retry::{retry_on_throttle, RetryPolicy};
pub use summarize::{summarize, QueryExtraction, StepSummary};

pub use metrics::METRICS;
pub use obs::{
    emit_batch_finished, emit_question_failed, emit_question_finished, emit_question_started,
    emit_throttle_retry, question_span,
};
pub use telemetry::init_tracing;

/// steplens version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
