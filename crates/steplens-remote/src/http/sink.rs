//! Langfuse-style batch ingestion sink.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{build_client, check_status, trim_slash};
use crate::error::RemoteError;
use crate::runtime::RemoteResult;
use crate::sink::{SinkEvent, TelemetrySink};

const SERVICE: &str = "telemetry-sink";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkClientConfig {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
    /// Buffered events that trigger an automatic flush
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_flush_every() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

impl SinkClientConfig {
    pub fn new(host: &str, public_key: &str, secret_key: &str) -> Self {
        Self {
            host: host.to_string(),
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
            flush_every: default_flush_every(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// One element of the ingestion batch.
#[derive(Debug, Clone, Serialize)]
struct Envelope {
    id: String,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: SinkEvent,
}

#[derive(Debug, Default, Deserialize)]
struct IngestionResult {
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug)]
pub struct LangfuseSink {
    config: SinkClientConfig,
    http_client: reqwest::Client,
    buffer: Mutex<Vec<Envelope>>,
}

impl LangfuseSink {
    pub fn new(config: SinkClientConfig) -> RemoteResult<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http_client,
            buffer: Mutex::new(Vec::new()),
        })
    }

    async fn post_batch(&self, batch: Vec<Envelope>) -> RemoteResult<()> {
        let url = format!("{}/api/public/ingestion", trim_slash(&self.config.host));
        let size = batch.len();
        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&serde_json::json!({ "batch": batch }))
            .send()
            .await?;
        let response = check_status(SERVICE, response).await?;
        let result: IngestionResult = response.json().await.unwrap_or_default();
        if !result.errors.is_empty() {
            warn!(rejected = result.errors.len(), size, "ingestion batch partially rejected");
            return Err(RemoteError::Status {
                service: SERVICE.to_string(),
                status: 207,
                message: Value::Array(result.errors).to_string(),
            });
        }
        debug!(size, "ingestion batch delivered");
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for LangfuseSink {
    async fn send(&self, event: SinkEvent) -> RemoteResult<()> {
        let ready = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(Envelope {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                event,
            });
            if buffer.len() >= self.config.flush_every.max(1) {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };
        if ready.is_empty() {
            return Ok(());
        }
        self.post_batch(ready).await
    }

    async fn flush(&self) -> RemoteResult<()> {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        if batch.is_empty() {
            return Ok(());
        }
        self.post_batch(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TraceBody;

    #[test]
    fn envelope_flattens_event_type_and_body() {
        let envelope = Envelope {
            id: "e-1".into(),
            timestamp: Utc::now(),
            event: SinkEvent::TraceUpsert(TraceBody::new("t-1")),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["id"], "e-1");
        assert_eq!(value["type"], "trace-create");
        assert_eq!(value["body"]["id"], "t-1");
        assert!(value.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn flush_on_empty_buffer_makes_no_request() {
        let sink = LangfuseSink::new(SinkClientConfig::new("http://127.0.0.1:9", "pk", "sk")).unwrap();
        sink.flush().await.unwrap();
    }
}
