pub mod error;
pub mod retry;

use crate::config::ClientConfig;
use anyhow::Result;
use async_trait::async_trait;
use self::error::ClientError;
use self::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Header carrying the per-run correlation id, echoed by the service
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Which stage of the chunk/combine tree a call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Per-chunk summary request
    Chunk,
    /// Combine batch request
    Combine,
    /// Coverage-compression pass
    Compression,
    /// Per-chunk answer request
    QueryChunk,
    /// Answer combine request
    QueryCombine,
}

impl CallPhase {
    /// Wire/log name for the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Chunk => "chunk",
            CallPhase::Combine => "combine",
            CallPhase::Compression => "compression",
            CallPhase::QueryChunk => "q-chunk",
            CallPhase::QueryCombine => "q-combine",
        }
    }

    fn is_query(&self) -> bool {
        matches!(self, CallPhase::QueryChunk | CallPhase::QueryCombine)
    }
}

/// Metadata attached to every model call so failures can be traced across
/// the chunk/combine tree
#[derive(Debug, Clone)]
pub struct CallMeta {
    /// Correlation id of the originating summarize/query run
    pub run_id: String,
    pub phase: CallPhase,
    /// One-based position within the phase, when the phase is chunked
    pub index: Option<usize>,
    pub total: Option<usize>,
}

impl CallMeta {
    /// Metadata for a phase without chunk position
    pub fn new(run_id: impl Into<String>, phase: CallPhase) -> Self {
        Self {
            run_id: run_id.into(),
            phase,
            index: None,
            total: None,
        }
    }

    /// Attach a one-based chunk position
    pub fn with_position(mut self, index: usize, total: usize) -> Self {
        self.index = Some(index);
        self.total = Some(total);
        self
    }
}

/// Chat message in the completion endpoint's wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// A summarize/answer service: one prompt in, plain text out
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one prompt and return the model's text, retrying transient
    /// transport failures internally
    async fn call(&self, prompt: &str, meta: &CallMeta) -> Result<String, ClientError>;
}

/// Enforces minimum spacing between outbound requests, independent of any
/// retry backoff
struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP client for the remote completion endpoint.
///
/// Speaks the OpenAI-style chat-completions contract: request
/// `{model, messages, max_tokens, temperature}`, response
/// `{choices: [{message: {content}}]}`.
pub struct RemoteModelClient {
    config: ClientConfig,
    retry: RetryPolicy,
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl RemoteModelClient {
    /// Create a client from configuration
    pub fn new(config: ClientConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let limiter = RateLimiter::new(Duration::from_millis(config.min_request_interval_ms));

        Ok(Self {
            config,
            retry,
            http,
            limiter,
        })
    }

    async fn send_once(&self, prompt: &str, meta: &CallMeta) -> Result<String, ClientError> {
        self.limiter.acquire().await;

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_instruction(meta.phase).to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(
            phase = meta.phase.as_str(),
            index = ?meta.index,
            total = ?meta.total,
            "Sending model request ({} chars)",
            prompt.len()
        );

        let mut builder = self
            .http
            .post(&self.config.endpoint)
            .json(&request)
            .header(CORRELATION_HEADER, &meta.run_id);
        if let Some(key) = &self.config.api_key {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let completion: CompletionResponse = response
                .json()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            let content = completion
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .unwrap_or_default();
            if content.trim().is_empty() {
                return Err(ClientError::InvalidResponse(
                    "response contained no content".to_string(),
                ));
            }
            return Ok(content);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body, status.as_u16());

        match status.as_u16() {
            429 => Err(ClientError::RateLimited {
                message,
                retry_after,
            }),
            s if (500..=599).contains(&s) => Err(ClientError::Server { status: s, message }),
            s => Err(ClientError::Rejected { status: s, message }),
        }
    }
}

#[async_trait]
impl ModelClient for RemoteModelClient {
    async fn call(&self, prompt: &str, meta: &CallMeta) -> Result<String, ClientError> {
        self.retry.run(|_attempt| self.send_once(prompt, meta)).await
    }
}

fn system_instruction(phase: CallPhase) -> &'static str {
    if phase.is_query() {
        "You are a helpful assistant that answers questions about video content. \
         Ground every statement in the provided captions and cite timestamps only from the supplied reference list."
    } else {
        "You are a helpful assistant that creates concise, well-structured summaries. \
         Use clear section headers (##). Prefer short, high-signal text. Use **bold** sparingly for emphasis."
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pull a human-readable message out of an error body; the service replies
/// with `{"error": "..."}` or the upstream `{"error": {"message": "..."}}`
fn extract_error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = value.get("error") {
            if let Some(text) = error.as_str() {
                return text.to_string();
            }
            if let Some(text) = error.get("message").and_then(|m| m.as_str()) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("request failed ({})", status)
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error": "Prompt too large"}"#, 413),
            "Prompt too large"
        );
        assert_eq!(
            extract_error_message(r#"{"error": {"message": "Upstream error"}}"#, 502),
            "Upstream error"
        );
        assert_eq!(extract_error_message("", 500), "request failed (500)");
        assert_eq!(extract_error_message("plain text", 500), "plain text");
    }

    #[test]
    fn test_call_phase_names() {
        assert_eq!(CallPhase::Chunk.as_str(), "chunk");
        assert_eq!(CallPhase::QueryCombine.as_str(), "q-combine");
        assert!(CallPhase::QueryChunk.is_query());
        assert!(!CallPhase::Compression.is_query());
    }

    #[test]
    fn test_call_meta_position() {
        let meta = CallMeta::new("run-1", CallPhase::Chunk).with_position(2, 5);
        assert_eq!(meta.index, Some(2));
        assert_eq!(meta.total, Some(5));
        assert_eq!(meta.run_id, "run-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(900));

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
