use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::error::TranscriptionError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 2000;
pub const DEFAULT_MAX_JITTER_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempts run out.
///
/// Only transient errors (see [`TranscriptionError::is_transient`]) are retried. Running out of
/// attempts yields [`TranscriptionError::ResourceExhausted`] instead of the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, TranscriptionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TranscriptionError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                return Err(TranscriptionError::ResourceExhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                let delay = policy.backoff(attempt) + policy.jitter();
                warn!(
                    "{} attempt {}/{} failed: {}. Retrying in {:?}",
                    operation_name, attempt, max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::ProviderKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited() -> TranscriptionError {
        TranscriptionError::Api {
            provider: ProviderKind::Gemini,
            status: 429,
            body: "RESOURCE_EXHAUSTED".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(5);
        let result: Result<(), _> = retry_with_backoff(&policy, "generate", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(rate_limited())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(TranscriptionError::ResourceExhausted { operation, attempts, last_error }) => {
                assert_eq!(operation, "generate");
                assert_eq!(attempts, 5);
                assert!(last_error.contains("429"));
            }
            other => panic!("expected ResourceExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(5);
        let result: Result<(), _> = retry_with_backoff(&policy, "generate", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TranscriptionError::Api {
                provider: ProviderKind::Gemini,
                status: 400,
                body: "bad request".to_string(),
            })
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TranscriptionError::Api { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(&RetryPolicy::immediate(5), "upload", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(TranscriptionError::MalformedResponse {
                    provider: ProviderKind::Gemini,
                    detail: "unexpected end of JSON input".to_string(),
                })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
