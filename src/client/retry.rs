use super::error::ClientError;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Retry-with-backoff policy shared by every remote call site.
///
/// One parameterized combinator instead of a hand-rolled loop per call site;
/// call sites differ only in their attempt bound, backoff cap, and retry
/// predicate.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// First backoff delay; doubles each attempt
    pub base_delay: Duration,
    /// Upper bound on the exponential delay, before jitter
    pub max_delay: Duration,
    /// Random jitter added on top of the capped delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(12_000),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom cap on the exponential delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Policy with a custom retry bound
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the next attempt. A server-provided hint overrides the
    /// computed backoff entirely.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exponential.min(self.max_delay) + jitter(self.max_jitter)
    }

    /// Run `op` until it succeeds, its error stops being retryable, or the
    /// retry budget is spent. `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.run_if(ClientError::is_retryable, op).await
    }

    /// Like `run`, with a caller-supplied retry predicate. Context
    /// invalidation is never retried regardless of the predicate.
    pub async fn run_if<T, F, Fut, P>(&self, is_retryable: P, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
        P: Fn(&ClientError) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_terminal() || !is_retryable(&err) => return Err(err),
                Err(err) if attempt >= self.max_retries => {
                    return Err(ClientError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt, err.retry_after());
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

// Sub-second clock noise gives enough spread to decorrelate concurrent
// retries without a randomness dependency.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    Duration::from_millis(nanos % (max_ms + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_honors_server_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        // The hint overrides even on late attempts
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_millis(500))),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            max_jitter: Duration::ZERO,
        };

        assert_eq!(policy.delay_for(0, None), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(4, None), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(10, None), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_exhausts_retry_budget() {
        let policy = fast_policy();
        let attempts = AtomicU32::new(0);

        let result: Result<(), ClientError> = policy
            .run(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ClientError::Server {
                        status: 503,
                        message: "unavailable".into(),
                    })
                }
            })
            .await;

        // max_retries + 1 total attempts
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        match result {
            Err(ClientError::RetriesExhausted { attempts: n, source }) => {
                assert_eq!(n, 5);
                assert!(matches!(*source, ClientError::Server { status: 503, .. }));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let policy = fast_policy();
        let attempts = AtomicU32::new(0);

        let result: Result<(), ClientError> = policy
            .run(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ClientError::Rejected {
                        status: 400,
                        message: "bad request".into(),
                    })
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ClientError::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_context_invalidation_short_circuits_permissive_predicate() {
        let policy = fast_policy();
        let attempts = AtomicU32::new(0);

        // Even a retry-everything predicate must not retry teardown
        let result: Result<(), ClientError> = policy
            .run_if(
                |_| true,
                |_| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(ClientError::ContextInvalidated("reloaded".into())) }
                },
            )
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ClientError::ContextInvalidated(_))));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let policy = fast_policy();
        let attempts = AtomicU32::new(0);

        let result = policy
            .run(|attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ClientError::Transport("connection reset".into()))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
