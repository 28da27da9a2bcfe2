//! Batch input: trajectories of questions with ground truth.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured ground truth for generated-query evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryGroundTruth {
    pub ground_truth_sql_query: String,
    pub ground_truth_sql_context: String,
    pub ground_truth_answer: String,
    #[serde(default)]
    pub ground_truth_query_result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroundTruth {
    Query(QueryGroundTruth),
    Text(String),
}

impl GroundTruth {
    pub fn as_query(&self) -> Option<&QueryGroundTruth> {
        match self {
            GroundTruth::Query(q) => Some(q),
            GroundTruth::Text(_) => None,
        }
    }

    /// Reference answer text used by answer-level judging.
    pub fn reference_answer(&self) -> &str {
        match self {
            GroundTruth::Query(q) => &q.ground_truth_answer,
            GroundTruth::Text(t) => t,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            GroundTruth::Text(t) => Value::String(t.clone()),
            GroundTruth::Query(q) => serde_json::to_value(q).unwrap_or(Value::Null),
        }
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "question_id must be a string or number, got {other}"
        ))),
    }
}

/// One test question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub question_id: String,
    pub question: String,
    pub ground_truth: GroundTruth,
    /// Evaluation-type tag, e.g. `RAG`, `TEXT2SQL`, `COT`
    pub question_type: String,
}

/// Trajectory key -> ordered questions, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchInput {
    pub trajectories: Vec<(String, Vec<QuestionRecord>)>,
}

impl BatchInput {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn question_count(&self) -> usize {
        self.trajectories.iter().map(|(_, qs)| qs.len()).sum()
    }
}

struct BatchVisitor;

impl<'de> Visitor<'de> for BatchVisitor {
    type Value = BatchInput;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of trajectory name to question list")
    }

    fn visit_map<A>(self, mut access: A) -> Result<BatchInput, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut trajectories = Vec::new();
        while let Some((key, questions)) = access.next_entry::<String, Vec<QuestionRecord>>()? {
            trajectories.push((key, questions));
        }
        Ok(BatchInput { trajectories })
    }
}

impl<'de> Deserialize<'de> for BatchInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(BatchVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"{
        "Trajectory9": [
            {"question_id": 1, "question": "What is the refund window?", "ground_truth": "30 days", "question_type": "RAG"}
        ],
        "Trajectory2": [
            {"question_id": "q-2", "question": "How many orders shipped?",
             "ground_truth": {
                "ground_truth_sql_query": "SELECT count(*) FROM orders WHERE shipped",
                "ground_truth_sql_context": "orders(id, shipped)",
                "ground_truth_answer": "42 orders",
                "ground_truth_query_result": [[42]]
             },
             "question_type": "TEXT2SQL"},
            {"question_id": 3, "question": "Why?", "ground_truth": "because", "question_type": "COT"}
        ]
    }"#;

    #[test]
    fn trajectories_keep_document_order() {
        let batch = BatchInput::from_json(BATCH).unwrap();
        let keys: Vec<&str> = batch.trajectories.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Trajectory9", "Trajectory2"]);
        assert_eq!(batch.question_count(), 3);
    }

    #[test]
    fn ground_truth_shapes_are_distinguished() {
        let batch = BatchInput::from_json(BATCH).unwrap();
        let rag = &batch.trajectories[0].1[0];
        assert_eq!(rag.question_id, "1");
        assert_eq!(rag.ground_truth, GroundTruth::Text("30 days".into()));

        let sql = &batch.trajectories[1].1[0];
        let q = sql.ground_truth.as_query().unwrap();
        assert_eq!(q.ground_truth_answer, "42 orders");
        assert_eq!(sql.ground_truth.reference_answer(), "42 orders");
    }

    #[test]
    fn bad_question_id_is_rejected() {
        let text = r#"{"T": [{"question_id": [1], "question": "q", "ground_truth": "g", "question_type": "RAG"}]}"#;
        assert!(BatchInput::from_json(text).is_err());
    }
}
