//! Error types for steplens-remote

use thiserror::Error;

/// Errors raised at a remote boundary (agent runtime, judge model, sink).
///
/// Cloneable so scripted fakes can hand out the same failure repeatedly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The provider asked us to slow down
    #[error("{service} throttled the request: {message}")]
    Throttled { service: String, message: String },

    /// Non-success HTTP status or provider-reported exception
    #[error("{service} returned {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    /// Exception reported inside an otherwise successful response stream
    #[error("{service} reported {code}: {message}")]
    Provider {
        service: String,
        code: String,
        message: String,
    },

    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("malformed response from {service}: {message}")]
    Decode { service: String, message: String },

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Build a throttling error for `service`.
    pub fn throttled(service: &str, message: impl Into<String>) -> Self {
        RemoteError::Throttled {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Build a decode error for `service`.
    pub fn decode(service: &str, message: impl Into<String>) -> Self {
        RemoteError::Decode {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Classify an exception name reported by a provider. Throttling codes
    /// become [`RemoteError::Throttled`].
    pub fn from_provider_code(service: &str, code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        if code.eq_ignore_ascii_case("throttlingException") {
            return RemoteError::throttled(service, message);
        }
        RemoteError::Provider {
            service: service.to_string(),
            code: code.to_string(),
            message,
        }
    }

    /// Whether the failure is a provider throttling signal and may be retried.
    pub fn is_throttling(&self) -> bool {
        matches!(self, RemoteError::Throttled { .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            return RemoteError::Throttled {
                service: "http".to_string(),
                message: err.to_string(),
            };
        }
        RemoteError::Transport(err.to_string())
    }
}
