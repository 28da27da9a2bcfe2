//! Error taxonomy for steplens-core.

use steplens_remote::RemoteError;

/// Ways a judge reply can fail to become a verdict.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgeParseError {
    #[error("judge reply is not valid JSON: {0}")]
    Malformed(String),

    #[error("judge reply is not a JSON object")]
    NotAnObject,

    #[error("judge reply missing required metric `{0}`")]
    MissingMetric(String),

    #[error("metric `{metric}` is not an object with a score")]
    MetricShape { metric: String },

    #[error("metric `{metric}` score {detail} is not a number in [0, 1]")]
    InvalidScore { metric: String, detail: String },
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Evaluation errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("agent stream completed without an answer chunk")]
    NoAnswerReceived,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("telemetry sink write failed: {0}")]
    Sink(RemoteError),

    #[error("judge verdict rejected: {0}")]
    JudgeParse(#[from] JudgeParseError),

    #[error("evaluation cancelled by operator")]
    Cancelled,

    #[error("illegal state transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("no evaluator configured for question type `{0}`")]
    UnknownEvaluationType(String),

    #[error("ground truth has the wrong shape: {0}")]
    GroundTruthShape(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// Throttling that exhausted the retry budget.
    pub fn is_throttling(&self) -> bool {
        matches!(self, EvalError::Remote(e) if e.is_throttling())
    }
}

/// Result type for steplens-core operations.
pub type Result<T> = std::result::Result<T, EvalError>;
