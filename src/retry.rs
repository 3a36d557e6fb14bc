use std::{future::Future, time::Duration};

use tracing::warn;

use crate::error::Result;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Bounded attempt budget with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based): `2^attempt` units.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Result of driving an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(attempt, ?delay, error = %err, "attempt failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Convenience for callers that only care about the final result.
pub async fn retry_result<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(policy, op).await.result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn delay_doubles_from_two_units() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let delays: Vec<_> = (1..=4).map(|a| policy.delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
    }

    #[test]
    fn zero_attempt_budget_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, DEFAULT_BACKOFF_UNIT).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let policy = RetryPolicy::default();
        let attempted = retry(&policy, |attempt| async move {
            if attempt < 3 {
                Err(UploadError::TransientNetwork("reset".into()))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(attempted.attempts, 3);
        assert_eq!(attempted.result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget_without_trailing_sleep() {
        let policy = RetryPolicy::default();
        let started = Instant::now();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let attempted: Attempted<()> = retry(&policy, |_| {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(started.elapsed());
                Err(UploadError::TransientNetwork("503".into()))
            }
        })
        .await;

        assert_eq!(attempted.attempts, 5);
        assert!(attempted.result.is_err());
        let calls = calls.lock().unwrap().clone();
        let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![2, 4, 8, 16]);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::default();
        let attempted: Attempted<()> = retry(&policy, |_| async {
            Err(UploadError::Handshake("401".into()))
        })
        .await;

        assert_eq!(attempted.attempts, 1);
        assert!(matches!(attempted.result, Err(UploadError::Handshake(_))));
    }
}
