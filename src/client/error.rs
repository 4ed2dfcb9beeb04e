use std::time::Duration;
use thiserror::Error;

/// Message fragments that indicate the host context was torn down mid-run
/// (e.g. the embedding environment reloaded); terminal and non-retryable.
const CONTEXT_INVALIDATED_PATTERNS: &[&str] = &[
    "context invalidated",
    "message port closed",
    "receiving end does not exist",
];

/// Failures surfaced by the remote model client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level failure reaching the model service
    #[error("network error reaching model service: {0}")]
    Transport(String),

    /// HTTP 429 from the model service
    #[error("model service rate limited the request: {message}")]
    RateLimited {
        message: String,
        /// Server-provided retry-after hint, already converted to a duration
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx from the model service
    #[error("model service error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Non-retryable HTTP 4xx (other than 429)
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 2xx response that did not contain usable model output
    #[error("invalid response from model service: {0}")]
    InvalidResponse(String),

    /// Host environment teardown detected on the transport; short-circuits
    /// every retry loop
    #[error("host context invalidated: {0}")]
    ContextInvalidated(String),

    /// Terminal failure after the bounded retry budget was spent
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Classify a transport-level failure, detecting host teardown by
    /// message pattern
    pub fn from_transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if CONTEXT_INVALIDATED_PATTERNS.iter().any(|p| lowered.contains(p)) {
            ClientError::ContextInvalidated(message)
        } else {
            ClientError::Transport(message)
        }
    }

    /// Whether the retry combinator may attempt this call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::RateLimited { .. }
                | ClientError::Server { .. }
        )
    }

    /// Whether this failure must immediately terminate the whole run
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::ContextInvalidated(_))
    }

    /// Server-provided delay hint, if the failure carried one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
