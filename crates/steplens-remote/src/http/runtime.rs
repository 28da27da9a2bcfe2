//! Agent-runtime gateway client.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{build_client, check_status, trim_slash};
use crate::error::RemoteError;
use crate::runtime::{
    ActionGroupSummary, AgentAlias, AgentRuntime, AgentSummary, AgentVersion,
    CollaboratorSummary, EventStream, InvokeRequest, InvokeStream, RawTraceEvent, RemoteResult,
};

const SERVICE: &str = "agent-runtime";

/// Gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeClientConfig {
    /// Base URL of the gateway
    pub endpoint: String,
    /// Optional bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout, including the full invocation stream
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl RuntimeClientConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// [`AgentRuntime`] backed by an HTTP gateway.
///
/// Invocation responses are newline-delimited JSON. Each line is either
/// `{"chunk": {"bytes": [...]}}`, `{"trace": {...}}`, or a single-key
/// exception object such as `{"throttlingException": {"message": "..."}}`.
pub struct HttpAgentRuntime {
    config: RuntimeClientConfig,
    http_client: reqwest::Client,
}

impl HttpAgentRuntime {
    pub fn new(config: RuntimeClientConfig) -> RemoteResult<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", trim_slash(&self.config.endpoint), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, field: &str) -> RemoteResult<T> {
        let response = self
            .authorize(self.http_client.get(self.url(path)))
            .send()
            .await?;
        let mut body: Value = check_status(SERVICE, response).await?.json().await?;
        let inner = body
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| RemoteError::decode(SERVICE, format!("missing `{field}`")))?;
        serde_json::from_value(inner).map_err(|e| RemoteError::decode(SERVICE, e.to_string()))
    }

    /// Follow `nextToken` pagination and concatenate `field` across pages.
    async fn list_all<T: DeserializeOwned>(&self, path: &str, field: &str) -> RemoteResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next: Option<String> = None;
        loop {
            let mut request = self.http_client.get(self.url(path));
            if let Some(token) = &next {
                request = request.query(&[("nextToken", token)]);
            }
            let response = self.authorize(request).send().await?;
            let body: Value = check_status(SERVICE, response).await?.json().await?;
            let page = body.get(field).cloned().unwrap_or(Value::Array(Vec::new()));
            let page: Vec<T> = serde_json::from_value(page)
                .map_err(|e| RemoteError::decode(SERVICE, e.to_string()))?;
            items.extend(page);
            next = body
                .get("nextToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if next.is_none() {
                return Ok(items);
            }
        }
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke_agent(&self, request: InvokeRequest) -> RemoteResult<InvokeStream> {
        let path = format!(
            "/agents/{}/agentAliases/{}/sessions/{}/text",
            request.agent_id, request.agent_alias_id, request.session_id
        );
        debug!(session_id = %request.session_id, "invoking agent");
        let response = self
            .authorize(self.http_client.post(self.url(&path)))
            .json(&json!({
                "inputText": request.input_text,
                "enableTrace": request.enable_trace,
            }))
            .send()
            .await?;
        let response = check_status(SERVICE, response).await?;

        let headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let response_metadata = json!({
            "httpStatusCode": response.status().as_u16(),
            "httpHeaders": headers,
        });

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(RemoteError::from));
        Ok(InvokeStream {
            response_metadata,
            events: decode_ndjson(body),
        })
    }

    async fn get_agent(&self, agent_id: &str) -> RemoteResult<AgentSummary> {
        self.get_json(&format!("/agents/{agent_id}/"), "agent").await
    }

    async fn get_agent_alias(&self, agent_id: &str, alias_id: &str) -> RemoteResult<AgentAlias> {
        self.get_json(
            &format!("/agents/{agent_id}/agentaliases/{alias_id}/"),
            "agentAlias",
        )
        .await
    }

    async fn get_agent_version(
        &self,
        agent_id: &str,
        version: &str,
    ) -> RemoteResult<AgentVersion> {
        self.get_json(
            &format!("/agents/{agent_id}/agentversions/{version}/"),
            "agentVersion",
        )
        .await
    }

    async fn list_agent_collaborators(
        &self,
        agent_id: &str,
        version: &str,
    ) -> RemoteResult<Vec<CollaboratorSummary>> {
        self.list_all(
            &format!("/agents/{agent_id}/agentversions/{version}/agentcollaborators/"),
            "agentCollaboratorSummaries",
        )
        .await
    }

    async fn list_agent_action_groups(
        &self,
        agent_id: &str,
        version: &str,
    ) -> RemoteResult<Vec<ActionGroupSummary>> {
        self.list_all(
            &format!("/agents/{agent_id}/agentversions/{version}/actiongroups/"),
            "actionGroupSummaries",
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// NDJSON decoding
// ---------------------------------------------------------------------------

struct LineState<S> {
    body: S,
    buf: Vec<u8>,
    done: bool,
}

/// Split a byte stream into lines and decode each as a [`RawTraceEvent`].
///
/// Blank lines are skipped; a trailing line without newline is still decoded.
/// A transport error ends the stream after being yielded.
pub fn decode_ndjson<S>(body: S) -> EventStream
where
    S: Stream<Item = RemoteResult<Vec<u8>>> + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body),
        buf: Vec::new(),
        done: false,
    };
    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some((decode_line(&line), st));
            }
            if st.done {
                if st.buf.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                let line = std::mem::take(&mut st.buf);
                return Some((decode_line(&line), st));
            }
            match st.body.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    st.done = true;
                    st.buf.clear();
                    return Some((Err(err), st));
                }
                None => st.done = true,
            }
        }
    })
    .boxed()
}

fn decode_line(line: &[u8]) -> RemoteResult<RawTraceEvent> {
    let value: Value =
        serde_json::from_slice(line).map_err(|e| RemoteError::decode(SERVICE, e.to_string()))?;

    if let Some(obj) = value.as_object() {
        if obj.len() == 1 {
            if let Some((code, detail)) = obj.iter().next() {
                if code.ends_with("Exception") {
                    let message = detail
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| detail.to_string());
                    return Err(RemoteError::from_provider_code(SERVICE, code, message));
                }
            }
        }
    }

    serde_json::from_value(value).map_err(|e| RemoteError::decode(SERVICE, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces(parts: &[&str]) -> impl Stream<Item = RemoteResult<Vec<u8>>> + Send + 'static {
        let owned: Vec<RemoteResult<Vec<u8>>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let body = pieces(&[
            "{\"trace\":{\"agentId\":\"A\"}}\n{\"chu",
            "nk\":{\"bytes\":[111,107]}}\n\n",
        ]);
        let events: Vec<_> = decode_ndjson(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(RawTraceEvent::Trace(_))));
        match &events[1] {
            Ok(RawTraceEvent::Chunk(c)) => assert_eq!(c.text(), "ok"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_decoded() {
        let body = pieces(&["{\"chunk\":{\"bytes\":[120]}}"]);
        let events: Vec<_> = decode_ndjson(body).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn throttling_line_becomes_throttled_error() {
        let body = pieces(&[
            "{\"trace\":{}}\n",
            "{\"throttlingException\":{\"message\":\"Rate exceeded\"}}\n",
        ]);
        let events: Vec<_> = decode_ndjson(body).collect().await;
        let err = events[1].as_ref().unwrap_err();
        assert!(err.is_throttling());
        assert!(err.to_string().contains("Rate exceeded"));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let body = futures::stream::iter(vec![
            Ok(b"{\"trace\":{}}\n{\"tra".to_vec()),
            Err(RemoteError::Transport("reset".into())),
            Ok(b"ce\":{}}\n".to_vec()),
        ]);
        let events: Vec<_> = decode_ndjson(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(RemoteError::Transport(_))));
    }

    #[tokio::test]
    async fn garbage_line_is_a_decode_error() {
        let events: Vec<_> = decode_ndjson(pieces(&["not json\n"])).collect().await;
        assert!(matches!(events[0], Err(RemoteError::Decode { .. })));
    }
}
