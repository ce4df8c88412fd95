//! Bounded retry for remote embedding calls.
//!
//! [`RetryPolicy::run`] re-issues an operation while it fails with a
//! retryable [`EmbedError`], up to `max_attempts` tries in total. The whole
//! sequence, sleeps included, is bounded by `max_elapsed`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::EmbedError;

/// Delay between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(failures - 1)`, capped at `cap`.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay to wait after the `failures`-th consecutive failure (1-based).
    pub fn delay(&self, failures: usize) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Exponential { base, cap } => {
                let shift = failures.saturating_sub(1).min(16) as u32;
                base.saturating_mul(1 << shift).min(cap)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Backoff,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(2)),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(Duration::ZERO),
            max_elapsed: Duration::from_secs(60),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts, or the wall-clock budget is spent. `op` receives the
    /// 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, EmbedError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, EmbedError>>,
    {
        let deadline = Instant::now() + self.max_elapsed;
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = match tokio::time::timeout(remaining, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(EmbedError::DeadlineExceeded(self.max_elapsed)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "{what} failed, giving up"
                );
                return Err(err);
            }

            let delay = self.backoff.delay(attempt);
            if Instant::now() + delay >= deadline {
                tracing::warn!(attempt, error = %err, "{what} failed, no time left to retry");
                return Err(EmbedError::DeadlineExceeded(self.max_elapsed));
            }

            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "{what} failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(350),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy::immediate(3);
        let result = policy
            .run("test call", |_| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(EmbedError::Transient("flaky".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy::immediate(3);
        let result: Result<(), _> = policy
            .run("test call", |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EmbedError::Transient("down".into()))
            })
            .await;
        assert!(matches!(result, Err(EmbedError::Transient(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy::immediate(3);
        let result: Result<(), _> = policy
            .run("test call", |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EmbedError::BatchTooLarge { size: 500, limit: 128 })
            })
            .await;
        assert!(matches!(result, Err(EmbedError::BatchTooLarge { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_bounds_total_time() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
            max_elapsed: Duration::from_millis(50),
        };
        let result: Result<(), _> = policy
            .run("test call", |_| async { Err(EmbedError::Transient("slow".into())) })
            .await;
        assert!(matches!(result, Err(EmbedError::DeadlineExceeded(_))));
    }
}
