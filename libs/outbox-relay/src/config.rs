//! Configuration for the writer, relay and cleanup job.
//!
//! Loads from environment variables with development-friendly defaults.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Outbox settings. One struct per process; the relay, writer and cleanup
/// job all read from it.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Master switch for the writer and the relay.
    pub enabled: bool,
    /// Tick period of the relay loop.
    pub poll_interval: Duration,
    /// Initial (or fixed, when dynamic batching is off) claim size.
    pub batch_size: i64,
    /// Retries granted before a row turns FAILED.
    pub max_retries: i32,
    /// Bounded timeout for one broker send.
    pub send_timeout: Duration,
    /// First retry backoff; doubles per retry.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Toggles the adaptive batch controller.
    pub dynamic_batching_enabled: bool,
    /// Toggles the circuit breaker gate.
    pub circuit_breaker_enabled: bool,
    /// Broker destination for relayed events.
    pub topic: String,
    pub cleanup_enabled: bool,
    /// PUBLISHED rows older than this many days are purged.
    pub retention_days: i64,
    /// Cron expression for the cleanup job (seconds field included).
    pub cleanup_schedule: String,
    /// Rows deleted per cleanup page.
    pub cleanup_page_size: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_millis(1_000),
            batch_size: 100,
            max_retries: 3,
            send_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            dynamic_batching_enabled: true,
            circuit_breaker_enabled: true,
            topic: "outbox.events".to_string(),
            cleanup_enabled: true,
            retention_days: 7,
            cleanup_schedule: "0 0 2 * * *".to_string(),
            cleanup_page_size: 1_000,
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            enabled: env::var("OUTBOX_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid OUTBOX_ENABLED")?,
            poll_interval: Duration::from_millis(
                env::var("OUTBOX_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("Invalid OUTBOX_POLL_INTERVAL_MS")?,
            ),
            batch_size: env::var("OUTBOX_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid OUTBOX_BATCH_SIZE")?,
            max_retries: env::var("OUTBOX_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid OUTBOX_MAX_RETRIES")?,
            send_timeout: Duration::from_secs(
                env::var("OUTBOX_SEND_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid OUTBOX_SEND_TIMEOUT_SECONDS")?,
            ),
            backoff_base: Duration::from_millis(
                env::var("OUTBOX_BACKOFF_BASE_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("Invalid OUTBOX_BACKOFF_BASE_MS")?,
            ),
            backoff_cap: Duration::from_millis(
                env::var("OUTBOX_BACKOFF_CAP_MS")
                    .unwrap_or_else(|_| "60000".to_string())
                    .parse()
                    .context("Invalid OUTBOX_BACKOFF_CAP_MS")?,
            ),
            dynamic_batching_enabled: env::var("OUTBOX_DYNAMIC_BATCHING_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid OUTBOX_DYNAMIC_BATCHING_ENABLED")?,
            circuit_breaker_enabled: env::var("OUTBOX_CIRCUIT_BREAKER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid OUTBOX_CIRCUIT_BREAKER_ENABLED")?,
            topic: env::var("OUTBOX_TOPIC").unwrap_or(defaults.topic),
            cleanup_enabled: env::var("OUTBOX_CLEANUP_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid OUTBOX_CLEANUP_ENABLED")?,
            retention_days: env::var("OUTBOX_RETENTION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid OUTBOX_RETENTION_DAYS")?,
            cleanup_schedule: env::var("OUTBOX_CLEANUP_SCHEDULE").unwrap_or(defaults.cleanup_schedule),
            cleanup_page_size: env::var("OUTBOX_CLEANUP_PAGE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid OUTBOX_CLEANUP_PAGE_SIZE")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OutboxConfig::default();
        assert!(config.enabled);
        assert_eq!(config.poll_interval, Duration::from_millis(1_000));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.send_timeout, Duration::from_secs(30));
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.backoff_cap, Duration::from_secs(60));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.cleanup_page_size, 1_000);
    }

    // One test touches the process environment so the cases cannot race
    // each other under the parallel test runner.
    #[test]
    fn from_env_overrides_falls_back_and_reports_garbage() {
        env::set_var("OUTBOX_POLL_INTERVAL_MS", "250");
        env::set_var("OUTBOX_MAX_RETRIES", "5");
        env::set_var("OUTBOX_TOPIC", "orders.events");

        let config = OutboxConfig::from_env().unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.topic, "orders.events");
        assert_eq!(config.batch_size, 100); // Default

        env::set_var("OUTBOX_BATCH_SIZE", "lots");
        let err = OutboxConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("OUTBOX_BATCH_SIZE"));

        env::remove_var("OUTBOX_POLL_INTERVAL_MS");
        env::remove_var("OUTBOX_MAX_RETRIES");
        env::remove_var("OUTBOX_TOPIC");
        env::remove_var("OUTBOX_BATCH_SIZE");
    }
}
