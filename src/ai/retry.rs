//! Exponential-backoff retry shared by the HTTP generators.

use crate::errors::GeneratorError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// No waiting between attempts.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Wait after the `attempt`-th failure (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Client errors other than rate limiting will not go away on retry.
pub fn is_retryable(err: &GeneratorError) -> bool {
    match err {
        GeneratorError::Http { .. }
        | GeneratorError::Timeout { .. }
        | GeneratorError::PredictionFailed { .. } => true,
        GeneratorError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or attempts run out.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    service: &'static str,
    mut op: F,
) -> Result<T, GeneratorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GeneratorError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(service, attempt, error = %e, "Request failed");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(GeneratorError::RetriesExhausted {
        service,
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> GeneratorError {
        GeneratorError::Api {
            service: "test",
            status: 503,
            message: "busy".into(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&server_error()));
        assert!(is_retryable(&GeneratorError::Api {
            service: "test",
            status: 429,
            message: String::new(),
        }));
        assert!(!is_retryable(&GeneratorError::Api {
            service: "test",
            status: 401,
            message: String::new(),
        }));
        assert!(!is_retryable(&GeneratorError::Parse("x".into())));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(RetryPolicy::immediate(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(server_error())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(RetryPolicy::immediate(2), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(server_error()) }
        })
        .await;
        assert!(matches!(
            result,
            Err(GeneratorError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(RetryPolicy::immediate(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GeneratorError::Api {
                    service: "test",
                    status: 401,
                    message: "bad key".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(GeneratorError::Api { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
