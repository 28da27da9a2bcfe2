//! Reconstructed reasoning steps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sub-payload kinds the summarizer and reporter look for.
pub mod kind {
    pub const MODEL_INVOCATION_INPUT: &str = "modelInvocationInput";
    pub const MODEL_INVOCATION_OUTPUT: &str = "modelInvocationOutput";
    pub const RATIONALE: &str = "rationale";
    pub const OBSERVATION: &str = "observation";
    pub const INVOCATION_INPUT: &str = "invocationInput";
}

/// One logical step of an agent's reasoning, merged from every fragment that
/// shared its correlation key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Zero-based position in the step sequence
    pub ordinal: usize,
    /// `None` for a step opened by a keyless fragment
    pub correlation_key: Option<String>,
    /// Non-trace fields of the fragment that opened the step
    pub metadata: Map<String, Value>,
    /// Kind -> most recently seen payload
    pub payloads: Map<String, Value>,
}

impl ReasoningStep {
    pub fn open(ordinal: usize, correlation_key: Option<String>, metadata: Map<String, Value>) -> Self {
        Self {
            ordinal,
            correlation_key,
            metadata,
            payloads: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.payloads.is_empty()
    }

    pub fn payload(&self, kind: &str) -> Option<&Value> {
        self.payloads.get(kind)
    }

    /// Follow `path` from the payload of `kind`.
    pub fn lookup(&self, kind: &str, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(self.payload(kind)?, |value, key| value.get(*key))
    }

    /// `rationale.text`, when present and a string.
    pub fn rationale_text(&self) -> Option<&str> {
        self.lookup(kind::RATIONALE, &["text"])
            .and_then(Value::as_str)
    }
}
