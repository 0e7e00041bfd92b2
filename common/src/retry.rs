//! Retry utilities using tryhard for resilient remote calls.

use core::fmt::Display;
use core::future::Future;
use core::time::Duration;

/// How often and how patiently a failing operation is retried.
///
/// Delays grow exponentially from `base_delay`: with the default of one
/// second that is 1s, 2s, 4s, 8s, 16s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy that runs the operation exactly once.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Retries an async operation following `policy`.
///
/// Logs each retry attempt and the final failure.
pub async fn retry_with_policy<F, Fut, T, E>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_retries = policy.max_retries;
    tryhard::retry_fn(operation)
        .retries(max_retries)
        .exponential_backoff(policy.base_delay)
        .on_retry(move |attempt, next_delay: Option<Duration>, error: &E| {
            tracing::warn!(
                attempt = attempt,
                max_retries = max_retries,
                next_delay_ms = next_delay.map_or(0, |d| d.as_millis()),
                error = %error,
                "Operation failed, retrying after backoff"
            );
            core::future::ready(())
        })
        .await
        .inspect_err(|e| {
            tracing::error!(
                max_retries = max_retries,
                error = %e,
                "Operation failed after all retry attempts"
            );
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<u32, String> =
            retry_with_policy(RetryPolicy::new(3, Duration::ZERO), move || {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), String> =
            retry_with_policy(RetryPolicy::new(2, Duration::ZERO), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            })
            .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_retry_runs_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let _: Result<(), &str> = retry_with_policy(RetryPolicy::no_retry(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down")
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
