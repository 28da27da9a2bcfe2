//! `reqwest` adapters for the three remote boundaries.
//!
//! - [`HttpAgentRuntime`]: agent-runtime gateway speaking newline-delimited
//!   JSON for the invocation stream
//! - [`HttpJudgeModel`]: OpenAI-compatible `/chat/completions`
//! - [`LangfuseSink`]: batched ingestion endpoint

mod judge;
mod runtime;
mod sink;

pub use judge::{HttpJudgeModel, JudgeClientConfig};
pub use runtime::{decode_ndjson, HttpAgentRuntime, RuntimeClientConfig};
pub use sink::{LangfuseSink, SinkClientConfig};

use std::time::Duration;

use crate::error::RemoteError;
use crate::runtime::RemoteResult;

const USER_AGENT: &str = concat!("steplens/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration) -> RemoteResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| RemoteError::Transport(format!("failed to create HTTP client: {e}")))
}

/// Map a non-success response to a typed error, consuming the body for the
/// message. 429 is throttling; 404 is not-found.
async fn check_status(service: &str, response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        429 => RemoteError::throttled(service, body),
        404 => RemoteError::NotFound(format!("{service}: {body}")),
        code => RemoteError::Status {
            service: service.to_string(),
            status: code,
            message: body,
        },
    })
}

fn trim_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}
