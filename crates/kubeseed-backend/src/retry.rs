//! Bounded retry with exponential backoff
//!
//! Only `Transient` errors are retried. `NotFound` and `Terminal` surface
//! immediately so callers can branch on them.

use crate::error::{BackendError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration for adapter operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Cap on the backoff delay.
    pub max_delay: Duration,

    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay.as_millis() as u64))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or attempts exhaust.
/// The last transient error is returned when attempts run out.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = BackendError::Transient("no attempts made".to_string());
    for attempt in 0..config.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                tracing::debug!(attempt, error = %e, "transient backend error, will retry");
                last_err = e;
            }
            Err(e) => return Err(e),
        }
        if attempt + 1 < config.max_attempts {
            sleep(config.delay_for_attempt(attempt)).await;
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryConfig::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BackendError::Transient("throttled".into()))
                } else {
                    Ok("i-123")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "i-123");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Terminal("quota exceeded".into())) }
        })
        .await;
        assert!(matches!(result, Err(BackendError::Terminal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_transient_error() {
        let result: Result<()> = retry(&RetryConfig::default(), || async {
            Err(BackendError::Transient("still throttled".into()))
        })
        .await;
        match result {
            Err(BackendError::Transient(msg)) => assert_eq!(msg, "still throttled"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
