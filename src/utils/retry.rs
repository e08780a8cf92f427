//! Retry scheduling with exponential backoff.
//!
//! Two consumers share the backoff schedule: `with_retry` drives inline
//! operations such as vector store setup, and the orchestrator asks
//! `delay_for_attempt` for requeue deadlines so backed-off jobs wait in
//! the queue instead of blocking a worker.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule shared by inline retries and job requeues.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts allowed, first try included.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles from there.
    pub initial_delay: Duration,
    /// Ceiling the growing delay saturates at.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff delay before attempt `attempt` (1-based; attempt 1 has no
    /// delay). The delay doubles per attempt and saturates at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(30);
        let factor = self.multiplier.powi(exponent as i32);
        Duration::from_secs_f64(self.initial_delay.as_secs_f64() * factor).min(self.max_delay)
    }
}

/// Classifies errors as transient or permanent.
pub trait Retryable {
    /// Returns true when retrying the operation could succeed.
    fn is_retryable(&self) -> bool;
}

/// Run an async operation, retrying transient failures on the configured
/// backoff schedule. Permanent errors and exhausted budgets return the
/// last error as-is.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= config.max_retries || !error.is_retryable() {
                    return Err(error);
                }
                let delay = config.delay_for_attempt(attempt + 1);
                sleep(delay + jitter(delay / 4)).await;
            }
        }
    }
}

/// Spread concurrent retriers apart so they do not hammer a recovering
/// backend in lockstep.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    Duration::from_millis(seed % max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct ScriptedError(&'static str);

    impl Retryable for ScriptedError {
        fn is_retryable(&self) -> bool {
            self.0.contains("transient")
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_backoff() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::new(3), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ScriptedError>("done")
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retried_until_success() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(5));
        let result = with_retry(&config, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ScriptedError("transient outage"))
            } else {
                Ok("recovered")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_immediately() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::new(3), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ScriptedError("permanent defect"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_bounds_total_attempts() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(5));
        let result = with_retry(&config, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ScriptedError("transient outage"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_doubles_and_saturates() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(350));
    }
}
