//! OpenAI-compatible chat-completions client used as judge.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{build_client, check_status, trim_slash};
use crate::error::RemoteError;
use crate::judge::{ChatRequest, JudgeModel};
use crate::runtime::RemoteResult;

const SERVICE: &str = "judge";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeClientConfig {
    /// Base URL, e.g. `https://api.openai.com/v1` or a LiteLLM proxy
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl JudgeClientConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

pub struct HttpJudgeModel {
    config: JudgeClientConfig,
    http_client: reqwest::Client,
}

impl HttpJudgeModel {
    pub fn new(config: JudgeClientConfig) -> RemoteResult<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

fn request_body(request: &ChatRequest) -> Value {
    json!({
        "model": request.model_id,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.user },
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "top_p": request.top_p,
    })
}

fn response_text(body: &Value) -> RemoteResult<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::decode(SERVICE, "response missing choices[0].message.content"))
}

#[async_trait]
impl JudgeModel for HttpJudgeModel {
    async fn complete(&self, request: ChatRequest) -> RemoteResult<String> {
        let url = format!("{}/chat/completions", trim_slash(&self.config.endpoint));
        let mut builder = self.http_client.post(url).json(&request_body(&request));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = check_status(SERVICE, builder.send().await?).await?;
        let body: Value = response.json().await?;
        response_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_system_and_user_messages() {
        let body = request_body(&ChatRequest::new("m", "be strict", "grade this"));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "grade this");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn missing_content_is_a_decode_error() {
        let err = response_text(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, RemoteError::Decode { .. }));
        let ok = response_text(&json!({
            "choices": [{ "message": { "content": "{\"overall\": 1}" } }]
        }))
        .unwrap();
        assert_eq!(ok, "{\"overall\": 1}");
    }
}
