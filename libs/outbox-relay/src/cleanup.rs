//! Scheduled purge of delivered rows.
//!
//! PUBLISHED rows older than the retention window are deleted in pages
//! until a short page signals the backlog is drained. FAILED rows are never
//! auto-deleted: they are the operator's inbox.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use event_id::{Clock, SystemClock};

use crate::config::OutboxConfig;
use crate::error::OutboxError;
use crate::event::OutboxStatus;
use crate::store::OutboxStore;

/// Cron-driven cleanup job (default 02:00 daily).
pub struct CleanupJob {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    retention_days: i64,
    page_size: i64,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn OutboxStore>, config: &OutboxConfig) -> Result<Self, OutboxError> {
        let schedule = Schedule::from_str(&config.cleanup_schedule).map_err(|e| {
            OutboxError::Config(format!(
                "invalid cleanup schedule '{}': {e}",
                config.cleanup_schedule
            ))
        })?;

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            schedule,
            retention_days: config.retention_days,
            page_size: config.cleanup_page_size,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run on schedule until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            retention_days = self.retention_days,
            page_size = self.page_size,
            "outbox cleanup job starting"
        );

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                error!("cleanup schedule yields no further occurrences, stopping");
                break;
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "outbox cleanup pass failed");
                    }
                }
            }
        }

        info!("outbox cleanup job stopped");
    }

    /// One full purge pass; returns rows deleted.
    pub async fn run_once(&self) -> Result<u64, OutboxError> {
        let cutoff = self.clock.now() - chrono::Duration::days(self.retention_days);
        let mut total = 0u64;

        loop {
            let deleted = self
                .store
                .delete_by_status_and_occurred_before(
                    OutboxStatus::Published,
                    cutoff,
                    self.page_size,
                )
                .await?;
            total += deleted;
            if (deleted as i64) < self.page_size {
                break;
            }
        }

        info!(
            deleted = total,
            cutoff = %cutoff,
            "outbox cleanup pass complete"
        );
        Ok(total)
    }
}
