//! Domain models for steplens.
//!
//! - `ReasoningStep`: one reconstructed step of an agent trace
//! - `AgentDescriptor`: snapshot of the agent under evaluation
//! - `QuestionRecord`: one batch question with its ground truth
//! - `EvaluationRecord`: the immutable result of a successful evaluation

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod question;
pub mod record;
pub mod step;

pub use descriptor::{AgentDescriptor, AgentType};
pub use digest::{canonical_json, trace_digest};
pub use error::{ConfigError, EvalError, JudgeParseError, Result};
pub use question::{BatchInput, GroundTruth, QueryGroundTruth, QuestionRecord};
pub use record::{EvaluationRecord, MetricScore, TokenUsage, Verdict};
pub use step::ReasoningStep;
