/// Retry policy with exponential backoff and jitter.
///
/// Attempt-count based: the schedule is driven by how many attempts have
/// been made, not by wall-clock bookkeeping. Used by the direct publisher;
/// the relay schedules its retries through the outbox table instead.
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub initial_interval: Duration,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Backoff ceiling
    pub max_interval: Duration,
    /// Add random jitter to each delay (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            jitter: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Execute a fallible future up to `max_attempts` times.
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(attempts = attempt, error = %e, "retry budget exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }

                let delay = backoff_for(&config, attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Delay before attempt `attempt + 1`, given `attempt` completed failures.
fn backoff_for(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let raw = config.initial_interval.as_millis() as f64 * config.multiplier.powi(exponent as i32);
    let capped = raw.min(config.max_interval.as_millis() as f64);

    if config.jitter {
        let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((capped * factor) as u64)
    } else {
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_interval: Duration::from_millis(10),
            multiplier: 2.0,
            max_interval: Duration::from_millis(200),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(fast(3), move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(fast(3), move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("temporary error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts_and_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(fast(3), move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>("persistent error") }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "persistent error");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn delays_grow_exponentially() {
        let start = std::time::Instant::now();

        let _ = with_retry(fast(4), || async { Err::<i32, _>("error") }).await;

        // Expected: 10ms + 20ms + 40ms = 70ms minimum between four attempts.
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn backoff_schedule_is_capped() {
        let config = fast(10);
        assert_eq!(backoff_for(&config, 1), Duration::from_millis(10));
        assert_eq!(backoff_for(&config, 2), Duration::from_millis(20));
        assert_eq!(backoff_for(&config, 3), Duration::from_millis(40));
        assert_eq!(backoff_for(&config, 8), Duration::from_millis(200)); // capped
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let config = fast(0);
        assert_eq!(config.max_attempts.max(1), 1);
    }
}
