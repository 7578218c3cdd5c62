//! Backoff policies and the shared retry executor

use std::future::Future;
use std::time::Duration;

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles on every retry
    Exponential,
}

/// Retry policy value object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay before a retry
    pub delay: Duration,
    /// Growth strategy
    pub backoff: Backoff,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Fixed delay between retries
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: Backoff::Fixed,
            max_delay: delay,
        }
    }

    /// Doubling delay between retries, capped at `max_delay`
    pub fn exponential(max_retries: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: Backoff::Exponential,
            max_delay,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    /// True if retrying may help
    fn is_retryable(&self) -> bool;
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Last attempt's result
    pub result: Result<T, E>,
    /// Attempts made, at least 1
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy.
///
/// `op` receives the 1-based attempt number. `on_retry` is called with the
/// attempt that just failed and its error before the backoff sleep.
pub async fn retry<T, E, F, Fut, R>(policy: &BackoffPolicy, mut op: F, mut on_retry: R) -> RetryOutcome<T, E>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E),
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return RetryOutcome { result: Ok(value), attempts: attempt },
            Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                on_retry(attempt, &err);
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return RetryOutcome { result: Err(err), attempts: attempt },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool { self.0 }
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = BackoffPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.max_attempts(), 6);
    }

    #[tokio::test]
    async fn test_always_failing_op_is_attempted_max_retries_plus_one() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();
        let policy = BackoffPolicy::fixed(2, Duration::ZERO);

        let outcome: RetryOutcome<(), Flaky> = retry(
            &policy,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(true)) }
            },
            |attempt, _| retries.push(attempt),
        )
        .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let policy = BackoffPolicy::fixed(5, Duration::ZERO);
        let outcome: RetryOutcome<(), Flaky> =
            retry(&policy, |_| async { Err(Flaky(false)) }, |_, _| {}).await;
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = BackoffPolicy::fixed(3, Duration::from_millis(1));
        let outcome: RetryOutcome<u32, Flaky> = retry(
            &policy,
            |attempt| async move { if attempt < 3 { Err(Flaky(true)) } else { Ok(attempt) } },
            |_, _| {},
        )
        .await;
        tokio_test::assert_ok!(&outcome.result);
        assert_eq!(outcome.attempts, 3);
    }
}
