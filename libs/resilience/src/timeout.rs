/// Hard time bounds for external calls.
///
/// The broker send and the dead-letter hand-off both run under these
/// wrappers so a stalled broker cannot wedge a relay tick.
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl TimeoutError {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

/// Run `future` to completion or fail after `duration`.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(duration))
}

/// Like [`with_timeout`], flattening the inner `Result`.
pub async fn with_timeout_result<F, T, E>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutError::OperationFailed(e.to_string())),
        Err(_) => Err(TimeoutError::Elapsed(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_bound() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn slow_future_is_cut_off() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(matches!(result, Err(TimeoutError::Elapsed(_))));
        assert!(result.unwrap_err().is_elapsed());
    }

    #[tokio::test]
    async fn inner_result_is_flattened() {
        let ok = with_timeout_result(Duration::from_secs(1), async { Ok::<_, String>(42) }).await;
        assert_eq!(ok.unwrap(), 42);

        let err = with_timeout_result(Duration::from_secs(1), async {
            Err::<i32, _>("operation failed")
        })
        .await;
        assert!(matches!(err, Err(TimeoutError::OperationFailed(_))));
        assert!(!err.unwrap_err().is_elapsed());
    }
}
