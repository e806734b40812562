//! Direct publisher settings.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use resilience::RetryConfig;

/// Settings for the non-outbox publish path.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Broker destination for published events.
    pub topic: String,
    /// Dead-letter destination for events that exhaust the retry budget.
    pub dlq_topic: String,
    /// Bounded timeout per broker send (events and dead letters alike).
    pub send_timeout: Duration,
    /// Attempt-count retry schedule.
    pub retry: RetryConfig,
    /// Directory for last-resort `{event_id}.json` backups.
    pub backup_dir: PathBuf,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "events".to_string(),
            dlq_topic: "events.dlq".to_string(),
            send_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            backup_dir: PathBuf::from("failed-events"),
        }
    }
}

impl PublisherConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            topic: env::var("PUBLISHER_TOPIC").unwrap_or(defaults.topic),
            dlq_topic: env::var("PUBLISHER_DLQ_TOPIC").unwrap_or(defaults.dlq_topic),
            send_timeout: Duration::from_secs(
                env::var("PUBLISHER_SEND_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid PUBLISHER_SEND_TIMEOUT_SECONDS")?,
            ),
            retry: RetryConfig {
                max_attempts: env::var("PUBLISHER_RETRY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .context("Invalid PUBLISHER_RETRY_MAX_ATTEMPTS")?,
                initial_interval: Duration::from_millis(
                    env::var("PUBLISHER_RETRY_INITIAL_INTERVAL_MS")
                        .unwrap_or_else(|_| "1000".to_string())
                        .parse()
                        .context("Invalid PUBLISHER_RETRY_INITIAL_INTERVAL_MS")?,
                ),
                multiplier: env::var("PUBLISHER_RETRY_MULTIPLIER")
                    .unwrap_or_else(|_| "2.0".to_string())
                    .parse()
                    .context("Invalid PUBLISHER_RETRY_MULTIPLIER")?,
                max_interval: Duration::from_millis(
                    env::var("PUBLISHER_RETRY_MAX_INTERVAL_MS")
                        .unwrap_or_else(|_| "60000".to_string())
                        .parse()
                        .context("Invalid PUBLISHER_RETRY_MAX_INTERVAL_MS")?,
                ),
                jitter: true,
            },
            backup_dir: env::var("PUBLISHER_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
        })
    }
}
