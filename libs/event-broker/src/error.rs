//! Broker error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by a broker send. The retryability flag feeds both the
/// relay's backoff scheduling and the circuit breaker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No acknowledgement within the bounded send timeout.
    #[error("broker send timed out after {0:?}")]
    Timeout(Duration),

    /// Delivery failed; `retryable` distinguishes transient broker trouble
    /// from permanent conditions.
    #[error("broker delivery failed: {message}")]
    Delivery { message: String, retryable: bool },

    /// The record itself was refused (too large, malformed); retrying the
    /// same bytes cannot succeed.
    #[error("broker rejected record: {0}")]
    Rejected(String),
}

impl BrokerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BrokerError::Timeout(_) => true,
            BrokerError::Delivery { retryable, .. } => *retryable,
            BrokerError::Rejected(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_transient_delivery_are_retryable() {
        assert!(BrokerError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(BrokerError::Delivery {
            message: "broker down".into(),
            retryable: true
        }
        .is_retryable());
    }

    #[test]
    fn rejection_is_terminal() {
        assert!(!BrokerError::Rejected("too large".into()).is_retryable());
        assert!(!BrokerError::Delivery {
            message: "bad record".into(),
            retryable: false
        }
        .is_retryable());
    }
}
