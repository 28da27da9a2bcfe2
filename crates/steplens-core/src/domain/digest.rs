//! Canonical JSON and SHA-256 digests of reconstructed traces.
//!
//! Object keys are ordered by UTF-16 code units and output is compact, so
//! the same step sequence always hashes to the same value regardless of how
//! the fragments were first parsed.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::error::Result;
use crate::domain::step::ReasoningStep;

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact canonical form of `value`.
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&canonicalize(value))?)
}

/// SHA-256 hex digest over the serialized step sequence.
pub fn trace_digest(steps: &[ReasoningStep]) -> Result<String> {
    let value = serde_json::to_value(steps)?;
    let canonical = canonical_json(&value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
