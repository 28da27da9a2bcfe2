//! Judge model boundary: single-turn chat completion, prompt in, text out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::runtime::RemoteResult;

/// One judge call. The harness always sends exactly one system and one user
/// message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model_id: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl ChatRequest {
    pub fn new(model_id: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system: system.into(),
            user: user.into(),
            max_tokens: 1024,
            temperature: 0.0,
            top_p: 1.0,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }
}

/// A chat model used as evaluator.
#[async_trait]
pub trait JudgeModel: Send + Sync {
    /// Run the completion and return the assistant's text verbatim.
    async fn complete(&self, request: ChatRequest) -> RemoteResult<String>;
}
