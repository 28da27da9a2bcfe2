//! steplens-remote: the three remote boundaries of the evaluation harness.
//!
//! - [`AgentRuntime`]: managed agent runtime (streaming invoke + descriptor lookups)
//! - [`JudgeModel`]: single-turn chat completion used as LLM-as-judge
//! - [`TelemetrySink`]: hierarchical trace/span/generation/score backend
//!
//! [`http`] holds `reqwest` adapters; [`fakes`] holds in-memory stand-ins.

pub mod error;
pub mod fakes;
pub mod http;
pub mod judge;
pub mod runtime;
pub mod sink;

pub use error::RemoteError;
pub use judge::{ChatRequest, JudgeModel};
pub use runtime::{
    ActionGroupSummary, AgentAlias, AgentRuntime, AgentSummary, AgentVersion, AliasRoute,
    AnswerChunk, CollaboratorSummary, EventStream, InvokeRequest, InvokeStream, RawTraceEvent,
    RemoteResult, TraceFragment, COLLABORATION_DISABLED,
};
pub use sink::{ObservationBody, ScoreBody, SinkEvent, TelemetrySink, TraceBody, UsageDetails};
