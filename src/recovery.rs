//! Generic retry-with-backoff used by each service adapter (SPEC_FULL.md §10.4).
//!
//! Circuit breaking lives in `services::circuit_breaker`; this module only
//! covers the "retry transient/rate-limited failures with jittered
//! exponential backoff" half of the resilience contract in §4.1.

use crate::error::{AppError, ServiceErrorKind};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Retry policy. Defaults mirror the adapter retry budget in SPEC_FULL.md §4.1/§10.4.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry `operation` while it fails with a `ServiceError` whose kind is
/// `Transient` or `RateLimited`. Any other `AppError` variant (including a
/// `ServiceError` of another kind) is returned immediately without retrying,
/// per SPEC_FULL.md §4.1: "all other kinds surface to the caller."
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "adapter call succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                let retryable = matches!(&err, AppError::Service(e) if e.kind.is_retryable());
                last_error = Some(err);

                if !retryable || attempt == config.max_attempts {
                    if attempt > 1 {
                        warn!(
                            operation = operation_name,
                            attempt,
                            error = %last_error.as_ref().unwrap(),
                            "adapter call exhausted retries"
                        );
                    }
                    break;
                }

                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %last_error.as_ref().unwrap(),
                    "adapter call failed, retrying"
                );

                let jitter = 1.0 + rand::random::<f64>() * 0.25;
                sleep(Duration::from_millis((delay.as_millis() as f64 * jitter) as u64)).await;
                delay = std::cmp::min(
                    Duration::from_millis((delay.as_millis() as f64 * config.backoff_multiplier) as u64),
                    config.max_delay,
                );
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        AppError::Service(crate::error::ServiceError::new(
            operation_name,
            ServiceErrorKind::Other,
            "operation failed with no recorded error",
        ))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(AppError::Service(ServiceError::transient("metadata", "timed out")))
                    } else {
                        Ok("ok")
                    }
                }
            },
            &fast_config(),
            "test_operation",
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<&str, AppError> = retry_with_backoff(
            || async { Err(AppError::Service(ServiceError::rate_limited("streaming", "429"))) },
            &fast_config(),
            "test_operation",
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_kind() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<&str, AppError> = retry_with_backoff(
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Service(ServiceError::new(
                        "scrobble",
                        crate::error::ServiceErrorKind::NotFound,
                        "no such artist",
                    )))
                }
            },
            &fast_config(),
            "test_operation",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
