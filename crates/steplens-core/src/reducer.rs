//! Trace reducer: fragments in delivery order -> ordered reasoning steps.
//!
//! Fragments are grouped by a correlation key found at unknown depth inside
//! each fragment. A fragment whose key differs from the open step's key
//! closes that step and opens a new one seeded with the fragment's non-trace
//! metadata; a keyless fragment merges into whatever step is open. Payloads
//! under the recognized category fields are merged into the open step with
//! last-write-wins per kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use steplens_remote::TraceFragment;
use tracing::debug;

use crate::domain::ReasoningStep;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    /// Field carrying the correlation key
    pub correlation_field: String,
    /// Trace-body fields whose sub-payloads are merged into steps
    pub category_fields: Vec<String>,
    /// Containers nested deeper than this are not searched
    pub max_depth: usize,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            correlation_field: "traceId".to_string(),
            category_fields: vec!["orchestrationTrace".to_string()],
            max_depth: 64,
        }
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn search_map(map: &Map<String, Value>, field: &str, depth: usize, max_depth: usize) -> Option<String> {
    if let Some(hit) = map.get(field).and_then(key_text) {
        return Some(hit);
    }
    if depth >= max_depth {
        return None;
    }
    map.values()
        .find_map(|child| search(child, field, depth + 1, max_depth))
}

fn search(value: &Value, field: &str, depth: usize, max_depth: usize) -> Option<String> {
    match value {
        Value::Object(map) => search_map(map, field, depth, max_depth),
        Value::Array(items) if depth < max_depth => items
            .iter()
            .find_map(|item| search(item, field, depth + 1, max_depth)),
        _ => None,
    }
}

/// Depth-first search for `field`; the first non-empty hit wins.
///
/// A map's own field is checked before its children. `max_depth` bounds how
/// many levels below `value` are visited.
pub fn find_correlation_key(value: &Value, field: &str, max_depth: usize) -> Option<String> {
    search(value, field, 0, max_depth)
}

#[derive(Debug, Clone, Default)]
pub struct TraceReducer {
    config: ReducerConfig,
}

impl TraceReducer {
    pub fn new(config: ReducerConfig) -> Self {
        Self { config }
    }

    /// Correlation key of one fragment, if any.
    pub fn correlation_key(&self, fragment: &TraceFragment) -> Option<String> {
        search_map(
            fragment.as_map(),
            &self.config.correlation_field,
            0,
            self.config.max_depth,
        )
    }

    /// Group `fragments` into steps. Pure and deterministic.
    pub fn reduce(&self, fragments: &[TraceFragment]) -> Vec<ReasoningStep> {
        let mut steps: Vec<ReasoningStep> = Vec::new();
        let mut open: Option<ReasoningStep> = None;

        for fragment in fragments {
            let key = self.correlation_key(fragment);
            let opens_new = match (&open, &key) {
                (None, _) => true,
                (Some(step), Some(key)) => step.correlation_key.as_deref() != Some(key.as_str()),
                (Some(_), None) => false,
            };

            if opens_new {
                if let Some(done) = open.take() {
                    if !done.is_empty() {
                        steps.push(done);
                    }
                }
            }
            let step = open
                .get_or_insert_with(|| ReasoningStep::open(steps.len(), key, fragment.metadata()));

            for field in &self.config.category_fields {
                if let Some(category) = fragment.category(field) {
                    for (kind, payload) in category {
                        step.payloads.insert(kind.clone(), payload.clone());
                    }
                }
            }
        }

        if let Some(done) = open {
            if !done.is_empty() {
                steps.push(done);
            }
        }

        debug!(fragments = fragments.len(), steps = steps.len(), "trace reduced");
        steps
    }
}
