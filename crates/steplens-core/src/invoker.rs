//! Agent invoker: one traced call, consumed in delivery order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use steplens_remote::{AgentRuntime, InvokeRequest, RawTraceEvent, TraceFragment};
use tracing::debug;

use crate::config::AgentConfig;
use crate::domain::{EvalError, Result, TokenUsage};
use crate::retry::{retry_on_throttle, RetryPolicy};

/// Everything one successful invocation produced.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Trace fragments in delivery order
    pub fragments: Vec<TraceFragment>,
    /// Answer chunks concatenated in delivery order
    pub answer: String,
    pub usage: TokenUsage,
    /// Start of the attempt that succeeded
    pub started_at: DateTime<Utc>,
    pub response_metadata: Value,
}

/// Token usage carried by one fragment: `modelInvocationOutput.metadata.usage`
/// under any step category. Missing counters count as zero.
pub fn fragment_usage(fragment: &TraceFragment) -> TokenUsage {
    let mut usage = TokenUsage::default();
    let Some(body) = fragment.trace_body() else {
        return usage;
    };
    for category in body.values() {
        let Some(counters) = category.pointer("/modelInvocationOutput/metadata/usage") else {
            continue;
        };
        usage += TokenUsage {
            input_tokens: counters.get("inputTokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: counters.get("outputTokens").and_then(Value::as_u64).unwrap_or(0),
        };
    }
    usage
}

pub struct AgentInvoker {
    runtime: Arc<dyn AgentRuntime>,
    agent: AgentConfig,
    retry: RetryPolicy,
}

impl AgentInvoker {
    pub fn new(runtime: Arc<dyn AgentRuntime>, agent: AgentConfig, retry: RetryPolicy) -> Self {
        Self {
            runtime,
            agent,
            retry,
        }
    }

    /// Invoke the agent, re-issuing the whole call on throttling.
    pub async fn invoke(&self, question: &str, session_id: &str) -> Result<Invocation> {
        retry_on_throttle(&self.retry, "invoke_agent", || self.invoke_once(question, session_id)).await
    }

    async fn invoke_once(&self, question: &str, session_id: &str) -> Result<Invocation> {
        let started_at = Utc::now();
        let request = InvokeRequest {
            input_text: question.to_string(),
            agent_id: self.agent.agent_id.clone(),
            agent_alias_id: self.agent.alias_id.clone(),
            session_id: session_id.to_string(),
            enable_trace: self.agent.enable_trace,
        };
        let mut stream = self.runtime.invoke_agent(request).await?;

        let mut fragments = Vec::new();
        let mut answer: Option<String> = None;
        let mut usage = TokenUsage::default();
        while let Some(event) = stream.events.next().await {
            match event? {
                RawTraceEvent::Chunk(chunk) => {
                    answer.get_or_insert_with(String::new).push_str(&chunk.text());
                }
                RawTraceEvent::Trace(fragment) => {
                    usage += fragment_usage(&fragment);
                    fragments.push(fragment);
                }
            }
        }

        let answer = answer.ok_or(EvalError::NoAnswerReceived)?;
        debug!(
            fragments = fragments.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "agent stream consumed"
        );
        Ok(Invocation {
            fragments,
            answer,
            usage,
            started_at,
            response_metadata: stream.response_metadata,
        })
    }
}
