//! In-memory fakes for the remote boundaries (testing only)
//!
//! `ScriptedAgentRuntime`, `ScriptedJudge` and `MemorySink` replay canned
//! responses and record what they were asked, so orchestration logic can be
//! exercised without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::error::RemoteError;
use crate::judge::{ChatRequest, JudgeModel};
use crate::runtime::*;
use crate::sink::{SinkEvent, TelemetrySink};

/// Answer-chunk event carrying `text`.
pub fn answer_event(text: &str) -> RawTraceEvent {
    RawTraceEvent::Chunk(AnswerChunk::from_text(text))
}

/// Trace-fragment event from a JSON object. Panics on non-objects.
pub fn trace_event(value: Value) -> RawTraceEvent {
    RawTraceEvent::Trace(TraceFragment::from_value(value).expect("trace fragment must be an object"))
}

// ---------------------------------------------------------------------------
// ScriptedAgentRuntime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Stream(Vec<RemoteResult<RawTraceEvent>>),
    Stall(Vec<RawTraceEvent>),
    Fail(RemoteError),
}

/// Agent runtime that replays one scripted outcome per `invoke_agent` call.
#[derive(Debug)]
pub struct ScriptedAgentRuntime {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<InvokeRequest>>,
    agent: AgentSummary,
    alias: AgentAlias,
    version: AgentVersion,
    collaborators: Vec<CollaboratorSummary>,
    action_groups: Vec<ActionGroupSummary>,
}

impl Default for ScriptedAgentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgentRuntime {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            agent: AgentSummary {
                agent_id: "AGENT1".to_string(),
                agent_name: "scripted-agent".to_string(),
                agent_collaboration: COLLABORATION_DISABLED.to_string(),
            },
            alias: AgentAlias {
                agent_alias_id: "ALIAS1".to_string(),
                routing_configuration: vec![AliasRoute {
                    agent_version: "1".to_string(),
                }],
            },
            version: AgentVersion {
                version: "1".to_string(),
                foundation_model: "arn:aws:bedrock:us-east-1:000000000000:inference-profile/us.anthropic.claude-3-5-sonnet".to_string(),
                instruction: "Answer questions about the warehouse.".to_string(),
                description: Some("scripted".to_string()),
            },
            collaborators: Vec::new(),
            action_groups: Vec::new(),
        }
    }

    /// Queue an invocation that yields `events` and completes.
    pub fn push_events(&self, events: Vec<RawTraceEvent>) -> &Self {
        self.push_stream(events.into_iter().map(Ok).collect())
    }

    /// Queue an invocation whose stream may fail part-way.
    pub fn push_stream(&self, events: Vec<RemoteResult<RawTraceEvent>>) -> &Self {
        self.scripts.lock().unwrap().push_back(Script::Stream(events));
        self
    }

    /// Queue an invocation that yields `events` and then never completes.
    pub fn push_stalled(&self, events: Vec<RawTraceEvent>) -> &Self {
        self.scripts.lock().unwrap().push_back(Script::Stall(events));
        self
    }

    /// Queue an invocation that fails before any event.
    pub fn push_failure(&self, error: RemoteError) -> &Self {
        self.scripts.lock().unwrap().push_back(Script::Fail(error));
        self
    }

    #[must_use]
    pub fn with_agent(mut self, agent: AgentSummary) -> Self {
        self.agent = agent;
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: AgentAlias) -> Self {
        self.alias = alias;
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: AgentVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_collaborators(mut self, collaborators: Vec<CollaboratorSummary>) -> Self {
        self.collaborators = collaborators;
        self
    }

    #[must_use]
    pub fn with_action_groups(mut self, groups: Vec<ActionGroupSummary>) -> Self {
        self.action_groups = groups;
        self
    }

    /// Every invoke request received so far, in order.
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Scripts not yet consumed.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgentRuntime {
    async fn invoke_agent(&self, request: InvokeRequest) -> RemoteResult<InvokeStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RemoteError::Transport("no scripted invocation left".to_string()))?;
        match script {
            Script::Fail(err) => Err(err),
            Script::Stream(events) => Ok(InvokeStream {
                response_metadata: json!({ "sessionId": request.session_id }),
                events: futures::stream::iter(events).boxed(),
            }),
            Script::Stall(events) => Ok(InvokeStream {
                response_metadata: json!({ "sessionId": request.session_id }),
                events: futures::stream::iter(events.into_iter().map(Ok))
                    .chain(futures::stream::pending())
                    .boxed(),
            }),
        }
    }

    async fn get_agent(&self, agent_id: &str) -> RemoteResult<AgentSummary> {
        if agent_id != self.agent.agent_id {
            return Err(RemoteError::NotFound(format!("agent {agent_id}")));
        }
        Ok(self.agent.clone())
    }

    async fn get_agent_alias(&self, _agent_id: &str, alias_id: &str) -> RemoteResult<AgentAlias> {
        if alias_id != self.alias.agent_alias_id {
            return Err(RemoteError::NotFound(format!("alias {alias_id}")));
        }
        Ok(self.alias.clone())
    }

    async fn get_agent_version(
        &self,
        _agent_id: &str,
        version: &str,
    ) -> RemoteResult<AgentVersion> {
        if version != self.version.version {
            return Err(RemoteError::NotFound(format!("version {version}")));
        }
        Ok(self.version.clone())
    }

    async fn list_agent_collaborators(
        &self,
        _agent_id: &str,
        _version: &str,
    ) -> RemoteResult<Vec<CollaboratorSummary>> {
        Ok(self.collaborators.clone())
    }

    async fn list_agent_action_groups(
        &self,
        _agent_id: &str,
        _version: &str,
    ) -> RemoteResult<Vec<ActionGroupSummary>> {
        Ok(self.action_groups.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedJudge
// ---------------------------------------------------------------------------

/// Judge that answers from a queue, falling back to a fixed reply when empty.
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    responses: Mutex<VecDeque<RemoteResult<String>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` whenever the queue is empty.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn push_response(&self, text: impl Into<String>) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn push_error(&self, error: RemoteError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl JudgeModel for ScriptedJudge {
    async fn complete(&self, request: ChatRequest) -> RemoteResult<String> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| RemoteError::Transport("no scripted judge response left".to_string()))
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that records every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
    fail_kind: Mutex<Option<String>>,
    flushes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent event of wire type `kind` (e.g. `span-create`).
    pub fn fail_on(&self, kind: &str) {
        *self.fail_kind.lock().unwrap() = Some(kind.to_string());
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded events of one wire type, in send order.
    pub fn events_of(&self, kind: &str) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn send(&self, event: SinkEvent) -> RemoteResult<()> {
        if self.fail_kind.lock().unwrap().as_deref() == Some(event.kind()) {
            return Err(RemoteError::Status {
                service: "memory-sink".to_string(),
                status: 500,
                message: format!("{} rejected", event.kind()),
            });
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn flush(&self) -> RemoteResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TraceBody;

    fn request() -> InvokeRequest {
        InvokeRequest {
            input_text: "q".into(),
            agent_id: "AGENT1".into(),
            agent_alias_id: "ALIAS1".into(),
            session_id: "s".into(),
            enable_trace: true,
        }
    }

    #[tokio::test]
    async fn scripted_runtime_replays_in_order() {
        let runtime = ScriptedAgentRuntime::new();
        runtime
            .push_failure(RemoteError::throttled("agent-runtime", "slow"))
            .push_events(vec![answer_event("hello")]);

        let first = runtime.invoke_agent(request()).await;
        assert!(first.unwrap_err().is_throttling());

        let second = runtime.invoke_agent(request()).await.unwrap();
        let events: Vec<_> = second.events.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(runtime.invocation_count(), 2);
        assert_eq!(runtime.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_yields_then_hangs() {
        let runtime = ScriptedAgentRuntime::new();
        runtime.push_stalled(vec![answer_event("partial")]);

        let mut stream = runtime.invoke_agent(request()).await.unwrap().events;
        assert!(stream.next().await.is_some());
        let next = tokio::time::timeout(std::time::Duration::from_secs(60), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn exhausted_runtime_errors() {
        let runtime = ScriptedAgentRuntime::new();
        assert!(runtime.invoke_agent(request()).await.is_err());
    }

    #[tokio::test]
    async fn scripted_judge_falls_back() {
        let judge = ScriptedJudge::always("{}");
        judge.push_response("first");
        let req = ChatRequest::new("m", "s", "u");
        assert_eq!(judge.complete(req.clone()).await.unwrap(), "first");
        assert_eq!(judge.complete(req).await.unwrap(), "{}");
        assert_eq!(judge.requests().len(), 2);
    }

    #[tokio::test]
    async fn memory_sink_can_reject_one_kind() {
        let sink = MemorySink::new();
        sink.fail_on("span-create");
        sink.send(SinkEvent::TraceUpsert(TraceBody::new("t")))
            .await
            .unwrap();
        let span = SinkEvent::SpanCreate(crate::sink::ObservationBody::new("s", "t"));
        assert!(sink.send(span).await.is_err());
        sink.flush().await.unwrap();
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.flush_count(), 1);
    }
}
