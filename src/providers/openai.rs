use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::ProviderError;
use crate::core::message::{Role, Turn};
use crate::core::provider::{ChatProvider, FragmentStream};
use crate::providers::sse::{DecodeStats, DecodeStatsSnapshot, SseDecoder, SseEvent};

/// Streaming client for OpenAI-compatible `/chat/completions` endpoints.
///
/// Holds at most one `reqwest::Client`, built on first use and reused until
/// `shutdown`. Every `stream` call owns its own request/response exchange.
pub struct OpenAiProvider {
    api_key: String,
    model_id: String,
    endpoint_url: String,
    timeout: Duration,
    client: tokio::sync::Mutex<Option<Client>>,
    stats: Arc<DecodeStats>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model_id: String, endpoint_url: String, timeout: Duration) -> Self {
        Self {
            api_key,
            model_id,
            endpoint_url,
            timeout,
            client: tokio::sync::Mutex::new(None),
            stats: Arc::new(DecodeStats::default()),
        }
    }

    /// Returns the persistent client, building it on first use.
    pub async fn connection(&self) -> Result<Client, ProviderError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .read_timeout(self.timeout)
            .build()?;
        tracing::debug!(endpoint = %self.endpoint_url, "opened API connection");
        *slot = Some(client.clone());
        Ok(client)
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Counters for decoded and skipped stream events across all requests.
    pub fn decode_stats(&self) -> DecodeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn request_body(&self, history: &[Turn]) -> serde_json::Value {
        let request = ChatRequest {
            model: &self.model_id,
            messages: history
                .iter()
                .map(|t| WireMessage {
                    role: t.role(),
                    content: t.content(),
                })
                .collect(),
            stream: true,
        };
        serde_json::to_value(&request).unwrap_or_else(|_| serde_json::json!({}))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn stream(&self, history: &[Turn]) -> Result<FragmentStream, ProviderError> {
        let client = self.connection().await?;
        let body = self.request_body(history);

        tracing::debug!(model = %self.model_id, turns = history.len(), "sending chat request");

        let resp = client
            .post(&self.endpoint_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "chat request rejected");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let byte_stream = resp.bytes_stream();
        let stats = Arc::clone(&self.stats);

        let stream = async_stream::stream! {
            use tokio_stream::StreamExt;

            let mut byte_stream = Box::pin(byte_stream);
            let mut decoder = SseDecoder::new(stats);
            let mut produced = 0usize;

            'read: while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ProviderError::Connection(e.to_string()));
                        break 'read;
                    }
                };

                for event in decoder.feed(&chunk) {
                    match event {
                        SseEvent::Fragment(text) => {
                            produced += 1;
                            yield Ok(text);
                        }
                        SseEvent::Done => break 'read,
                    }
                }
            }

            if let Some(SseEvent::Fragment(text)) = decoder.finish() {
                produced += 1;
                yield Ok(text);
            }

            tracing::debug!(fragments = produced, "chat stream finished");
        };

        Ok(Box::pin(stream))
    }

    async fn shutdown(&self) {
        if self.client.lock().await.take().is_some() {
            tracing::debug!(endpoint = %self.endpoint_url, "closed API connection");
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
