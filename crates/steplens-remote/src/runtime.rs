//! Agent runtime boundary.
//!
//! The managed runtime is a black box: we hand it a question and get back an
//! ordered stream of answer chunks and trace fragments. The descriptor calls
//! (`get_agent`, alias/version resolution, collaborator and action-group
//! listing) exist so the harness can snapshot what it is evaluating.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Field holding the runtime's nested trace body inside a fragment.
pub const TRACE_BODY_FIELD: &str = "trace";

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

/// One trace fragment as delivered by the runtime.
///
/// The shape is only partially fixed: a handful of metadata fields
/// (`agentId`, `sessionId`, `callerChain`, ...) plus a nested `trace` body
/// whose depth and layout vary by step category. The map is kept verbatim so
/// downstream code can search it without losing unknown fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceFragment(Map<String, Value>);

impl TraceFragment {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a fragment from any JSON value; non-objects are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The full fragment as a JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The fragment re-wrapped as a JSON value (clones).
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// The nested `trace` body, if present and an object.
    pub fn trace_body(&self) -> Option<&Map<String, Value>> {
        self.0.get(TRACE_BODY_FIELD).and_then(Value::as_object)
    }

    /// The sub-payload map under a step-category field of the trace body
    /// (e.g. `orchestrationTrace`).
    pub fn category(&self, field: &str) -> Option<&Map<String, Value>> {
        self.trace_body()
            .and_then(|body| body.get(field))
            .and_then(Value::as_object)
    }

    /// Every top-level field except the trace body.
    pub fn metadata(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != TRACE_BODY_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A chunk of the final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerChunk {
    pub bytes: Vec<u8>,
}

impl AnswerChunk {
    pub fn from_text(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
        }
    }

    /// Decode as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Element of the runtime's response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawTraceEvent {
    /// Final-answer bytes
    Chunk(AnswerChunk),
    /// Structured trace fragment
    Trace(TraceFragment),
}

/// Ordered event stream returned by an invocation.
pub type EventStream = BoxStream<'static, RemoteResult<RawTraceEvent>>;

/// Parameters of a single streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub input_text: String,
    pub agent_id: String,
    pub agent_alias_id: String,
    pub session_id: String,
    pub enable_trace: bool,
}

/// Handle to an in-flight invocation.
pub struct InvokeStream {
    /// Provider response metadata (request id, HTTP headers, ...)
    pub response_metadata: Value,
    /// Events in delivery order
    pub events: EventStream,
}

impl std::fmt::Debug for InvokeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeStream")
            .field("response_metadata", &self.response_metadata)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Descriptor lookups
// ---------------------------------------------------------------------------

/// Value of `agentCollaboration` for agents that do not orchestrate others.
pub const COLLABORATION_DISABLED: &str = "DISABLED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub agent_name: String,
    /// `DISABLED`, `SUPERVISOR`, `SUPERVISOR_ROUTER`, ...
    #[serde(default = "collaboration_disabled")]
    pub agent_collaboration: String,
}

fn collaboration_disabled() -> String {
    COLLABORATION_DISABLED.to_string()
}

impl AgentSummary {
    pub fn is_collaborative(&self) -> bool {
        self.agent_collaboration != COLLABORATION_DISABLED
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRoute {
    pub agent_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAlias {
    pub agent_alias_id: String,
    #[serde(default)]
    pub routing_configuration: Vec<AliasRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentVersion {
    pub version: String,
    /// Model id or ARN, possibly with a cross-region prefix
    pub foundation_model: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorSummary {
    pub collaborator_name: String,
    #[serde(default)]
    pub collaboration_instruction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionGroupSummary {
    pub action_group_id: String,
    pub action_group_name: String,
    #[serde(default)]
    pub action_group_state: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// AgentRuntime
// ---------------------------------------------------------------------------

/// Managed agent runtime.
///
/// Implementations must deliver events in the order the runtime produced
/// them and must surface provider throttling as [`RemoteError::Throttled`]
/// (whether it arrives before the stream opens or mid-stream).
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start a traced invocation and return its event stream.
    async fn invoke_agent(&self, request: InvokeRequest) -> RemoteResult<InvokeStream>;

    async fn get_agent(&self, agent_id: &str) -> RemoteResult<AgentSummary>;

    async fn get_agent_alias(&self, agent_id: &str, alias_id: &str) -> RemoteResult<AgentAlias>;

    async fn get_agent_version(&self, agent_id: &str, version: &str)
        -> RemoteResult<AgentVersion>;

    async fn list_agent_collaborators(
        &self,
        agent_id: &str,
        version: &str,
    ) -> RemoteResult<Vec<CollaboratorSummary>>;

    async fn list_agent_action_groups(
        &self,
        agent_id: &str,
        version: &str,
    ) -> RemoteResult<Vec<ActionGroupSummary>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_event_uses_runtime_wire_shape() {
        let chunk: RawTraceEvent = serde_json::from_value(json!({
            "chunk": { "bytes": [104, 105] }
        }))
        .unwrap();
        match chunk {
            RawTraceEvent::Chunk(c) => assert_eq!(c.text(), "hi"),
            other => panic!("expected chunk, got {other:?}"),
        }

        let trace: RawTraceEvent = serde_json::from_value(json!({
            "trace": { "agentId": "A1", "trace": { "orchestrationTrace": {} } }
        }))
        .unwrap();
        assert!(matches!(trace, RawTraceEvent::Trace(_)));
    }

    #[test]
    fn fragment_metadata_excludes_trace_body() {
        let fragment = TraceFragment::from_value(json!({
            "agentId": "A1",
            "sessionId": "s-1",
            "trace": { "orchestrationTrace": { "rationale": { "text": "r" } } }
        }))
        .unwrap();

        let meta = fragment.metadata();
        assert_eq!(meta.len(), 2);
        assert!(!meta.contains_key("trace"));
        assert!(fragment.category("orchestrationTrace").is_some());
        assert!(fragment.category("preProcessingTrace").is_none());
    }

    #[test]
    fn non_object_fragment_is_rejected() {
        assert!(TraceFragment::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn collaboration_defaults_to_disabled() {
        let summary: AgentSummary =
            serde_json::from_value(json!({ "agentId": "A1", "agentName": "solo" })).unwrap();
        assert!(!summary.is_collaborative());
    }
}
