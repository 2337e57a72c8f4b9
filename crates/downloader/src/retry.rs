//! Retry-with-backoff for manifest and segment fetches.
//!
//! Delays grow exponentially from the base and carry symmetric jitter so a
//! flapping CDN does not see synchronized retries from parallel jobs.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::DownloadError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    /// Symmetric jitter fraction; 0.2 means the delay varies by ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed over failed attempts).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self
            .factor
            .checked_pow(attempt)
            .unwrap_or(u32::MAX)
            .max(1);
        let nominal = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::from_secs(60));
        if self.jitter <= 0.0 {
            return nominal;
        }
        let scale = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        nominal.mul_f64(scale)
    }
}

/// Run `operation` until it succeeds, exhausts the policy, or hits a
/// non-retryable error. Cancellation is observed before every attempt and
/// during backoff sleeps, surfacing as [`DownloadError::Aborted`].
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, DownloadError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(DownloadError::Aborted);
        }
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(DownloadError::Aborted) => return Err(DownloadError::Aborted),
            Err(err) => {
                attempt += 1;
                if !err.is_retryable() || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(DownloadError::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 2,
            jitter: 0.0,
        }
    }

    fn transient() -> DownloadError {
        DownloadError::Io {
            source: std::io::Error::other("flaky"),
        }
    }

    #[test]
    fn delays_double_without_jitter() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..64 {
            let d = policy.delay_for_attempt(0).as_secs_f64();
            assert!((0.4..=0.6).contains(&d), "delay {d} outside ±20% band");
        }
    }

    #[tokio::test]
    async fn succeeds_without_retrying() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(), &token, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Ok::<_, DownloadError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(&fast_policy(), &token, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(&fast_policy(), &token, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(DownloadError::DrmRefused) }
        })
        .await;
        assert!(matches!(result, Err(DownloadError::DrmRefused)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn recovers_on_second_attempt() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(), &token, |attempt| {
            calls.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt == 0 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<u32, _> =
            retry_with_backoff(&fast_policy(), &token, |_| async { Ok(1) }).await;
        assert!(matches!(result, Err(DownloadError::Aborted)));
    }
}
