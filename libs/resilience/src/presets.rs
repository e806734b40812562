/// Preset configurations for the two dependencies this pipeline talks to.
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a dependency type
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: Option<RetryConfig>,
}

/// Kafka producer operations
///
/// - Timeout: 30s (delivery acknowledgement, not enqueue)
/// - Circuit breaker: 20-attempt window, 50% threshold, 30s cooldown
/// - Retry: 3 attempts with exponential backoff
pub fn kafka_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(30),
        },
        circuit_breaker: CircuitBreakerConfig {
            window_size: 20,
            failure_rate_threshold: 0.5,
            min_samples: 10,
            cooldown: Duration::from_secs(30),
        },
        retry: Some(RetryConfig {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            jitter: true,
        }),
    }
}

/// Database queries (PostgreSQL)
///
/// - Timeout: 10s (claim and update queries should be fast)
/// - Circuit breaker: more tolerant, the pool has its own health handling
/// - No retry (the outbox table is the retry mechanism)
pub fn database_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        circuit_breaker: CircuitBreakerConfig {
            window_size: 50,
            failure_rate_threshold: 0.6,
            min_samples: 20,
            cooldown: Duration::from_secs(30),
        },
        retry: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_preset_matches_relay_defaults() {
        let config = kafka_config();
        assert_eq!(config.timeout.duration, Duration::from_secs(30));
        assert_eq!(config.circuit_breaker.window_size, 20);
        assert_eq!(config.circuit_breaker.cooldown, Duration::from_secs(30));
        assert!(config.retry.is_some());
    }

    #[test]
    fn database_preset_never_retries() {
        let config = database_config();
        assert_eq!(config.timeout.duration, Duration::from_secs(10));
        assert!(config.retry.is_none());
    }
}
