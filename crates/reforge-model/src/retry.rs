// Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::ModelError;

const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// How many times a model call may be attempted, and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl ModelError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::NotFound(_) | ModelError::ConfigError(_) | ModelError::Refused(_) => {
                false
            }
            ModelError::Status { code, .. } => *code == 429 || *code >= 500,
            _ => true,
        }
    }
}

/// Execute `f` until it succeeds, a non-retryable error occurs, or the policy is exhausted
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T, ModelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts || !e.is_retryable() {
                    return Err(e);
                }

                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    error = %e,
                    "Model call failed (attempt {}/{}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_base_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(instant_policy(2), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ModelError::Http("connection reset".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(instant_policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::ExecutionFailed("boom".into()))
        })
        .await;
        assert!(matches!(result, Err(ModelError::ExecutionFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refusal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(instant_policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::Refused("no".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_retryability() {
        let throttled = ModelError::Status {
            code: 429,
            body: String::new(),
        };
        let bad_request = ModelError::Status {
            code: 400,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }
}
