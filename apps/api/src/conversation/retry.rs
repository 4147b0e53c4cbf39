//! Bounded retry combinator shared by the provider retrieval layer and the LLM client.
//!
//! Call sites supply a per-attempt closure and a [`RetryPolicy`]; the error type decides
//! through [`Retryable`] whether another attempt is worth making. Sleeping goes through
//! `tokio::time::sleep`, so tests drive it with a paused clock instead of real waits.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after each retry: `delay`, `2 * delay`, `4 * delay`, ...
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: initial_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16);
                self.delay.saturating_mul(1 << shift)
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Provider polling default: 5 attempts, 10 seconds apart.
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(10))
    }
}

/// Errors that know whether the failed operation may succeed if attempted again.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the policy's attempt
/// budget is spent. Returns the last error in the failure cases.
///
/// The closure receives the 1-based attempt number. At most `max_attempts` calls are made
/// and there is no sleep after the final attempt.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => {
                warn!("{label}: attempt {attempt} failed with non-recoverable error: {e}");
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                warn!("{label}: exhausted {attempt} attempts, last error: {e}");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{label}: attempt {attempt} failed ({e}), retrying in {}ms",
                    delay.as_millis()
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
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transient={}", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    #[test]
    fn test_exponential_delays_double() {
        let policy = RetryPolicy::exponential(4, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_use_whole_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_secs(10));
        let started = tokio::time::Instant::now();

        let result: Result<(), TestError> = retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: true }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // four sleeps between five attempts, none after the last
        assert_eq!(started.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), TestError> = retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();

        let result: Result<u32, TestError> = retry(&policy, "test", |attempt| async move {
            if attempt < 3 {
                Err(TestError { transient: true })
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }
}
