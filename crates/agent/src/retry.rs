//! Retry with exponential backoff for transient provider failures.

use sidekick_config::RetryConfig;
use sidekick_core::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a model call is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.initial_backoff.saturating_mul(1u32 << exponent);
        let delay = match error {
            ProviderError::RateLimited { retry_after_secs } => {
                exponential.max(Duration::from_secs(*retry_after_secs))
            }
            _ => exponential,
        };
        delay.min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt, &e);
                    warn!(
                        stage = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        let net = ProviderError::Network("reset".into());
        assert_eq!(p.backoff(1, &net), Duration::from_millis(100));
        assert_eq!(p.backoff(2, &net), Duration::from_millis(200));
        assert_eq!(p.backoff(3, &net), Duration::from_millis(400));
        assert_eq!(p.backoff(10, &net), Duration::from_secs(1));
    }

    #[test]
    fn rate_limit_honours_retry_after_within_cap() {
        let p = policy(5);
        let limited = ProviderError::RateLimited { retry_after_secs: 30 };
        assert_eq!(p.backoff(1, &limited), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("worker", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ProviderError::Timeout("slow".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(2)
            .run("worker", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::ApiError {
                    status_code: 502,
                    message: "bad gateway".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(ProviderError::ApiError { status_code: 502, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("evaluator", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::AuthenticationFailed("bad key".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
