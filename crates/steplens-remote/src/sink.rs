//! Telemetry sink boundary.
//!
//! The sink accepts a small hierarchical vocabulary: a run trace (created and
//! later updated by upserting with the same id), generations and spans nested
//! beneath it, and named numeric scores. Writes may be buffered until
//! [`TelemetrySink::flush`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::RemoteResult;

/// Trace create-or-update. Fields left `None` are not touched on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBody {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TraceBody {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Token usage attached to a generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDetails {
    pub input: u64,
    pub output: u64,
}

/// Body shared by generations and spans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationBody {
    pub id: String,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_observation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_details: Option<UsageDetails>,
}

impl ObservationBody {
    pub fn new(id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            trace_id: trace_id.into(),
            ..Default::default()
        }
    }
}

/// Named numeric score on a trace or on one of its observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub id: String,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<String>,
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One sink write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum SinkEvent {
    #[serde(rename = "trace-create")]
    TraceUpsert(TraceBody),
    #[serde(rename = "generation-create")]
    GenerationCreate(ObservationBody),
    #[serde(rename = "generation-update")]
    GenerationUpdate(ObservationBody),
    #[serde(rename = "span-create")]
    SpanCreate(ObservationBody),
    #[serde(rename = "score-create")]
    ScoreCreate(ScoreBody),
}

impl SinkEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            SinkEvent::TraceUpsert(_) => "trace-create",
            SinkEvent::GenerationCreate(_) => "generation-create",
            SinkEvent::GenerationUpdate(_) => "generation-update",
            SinkEvent::SpanCreate(_) => "span-create",
            SinkEvent::ScoreCreate(_) => "score-create",
        }
    }

    /// Id of the trace this event belongs to.
    pub fn trace_id(&self) -> &str {
        match self {
            SinkEvent::TraceUpsert(b) => &b.id,
            SinkEvent::GenerationCreate(b)
            | SinkEvent::GenerationUpdate(b)
            | SinkEvent::SpanCreate(b) => &b.trace_id,
            SinkEvent::ScoreCreate(b) => &b.trace_id,
        }
    }
}

/// Structured telemetry backend.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Queue or send one event.
    async fn send(&self, event: SinkEvent) -> RemoteResult<()>;

    /// Deliver everything buffered so far.
    async fn flush(&self) -> RemoteResult<()>;
}
