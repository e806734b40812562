//! The polling relay: claim, forward, reschedule.
//!
//! One relay instance runs per process, driven by a periodic tick. A tick
//! is one claim transaction: gate on the circuit breaker, claim up to the
//! current batch size under skip-locked row locks, forward each row to the
//! broker with a bounded timeout, write the per-row outcome back, commit.
//! Rows are claimed oldest first and keyed by event id, so a single active
//! relay presents an aggregate's events to the broker in commit order.
//!
//! Every tick is wrapped in a catch-all: the loop logs, counts and carries
//! on. It never terminates on error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use event_broker::{correlation_headers, BrokerAck, BrokerClient, BrokerError, BrokerRecord};
use event_id::{Clock, SystemClock};
use resilience::{CircuitBreaker, CircuitBreakerConfig, Permit};

use crate::batch::{BatchConfig, BatchController, BatchSnapshot};
use crate::config::OutboxConfig;
use crate::error::OutboxError;
use crate::event::OutboxEvent;
use crate::metrics::OutboxMetrics;
use crate::store::OutboxStore;

/// Grace window granted to the in-flight tick during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct RelayCounters {
    polled: AtomicU64,
    published: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    idle_ticks: AtomicU64,
    skipped_ticks: AtomicU64,
}

/// Point-in-time view of the relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub polled: u64,
    pub published: u64,
    pub retried: u64,
    pub failed: u64,
    pub idle_ticks: u64,
    pub skipped_ticks: u64,
}

impl RelayCounters {
    fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            polled: self.polled.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub polled: usize,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
    /// The breaker was open; no claim was attempted.
    pub skipped_open: bool,
}

/// Background publisher for outbox rows.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
    breaker: Option<CircuitBreaker>,
    batch: Option<BatchController>,
    counters: RelayCounters,
    metrics: Option<OutboxMetrics>,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn BrokerClient>,
        config: OutboxConfig,
    ) -> Self {
        let breaker = config
            .circuit_breaker_enabled
            .then(|| CircuitBreaker::new(CircuitBreakerConfig::default()));
        let batch = config.dynamic_batching_enabled.then(|| {
            BatchController::new(BatchConfig {
                initial: config.batch_size,
                ..Default::default()
            })
        });

        Self {
            store,
            broker,
            clock: Arc::new(SystemClock),
            config,
            breaker,
            batch,
            counters: RelayCounters::default(),
            metrics: None,
        }
    }

    /// Replace the wall clock; tests drive the relay deterministically.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Export tick counters and queue gauges to Prometheus as well.
    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the breaker, e.g. to tune window and cooldown.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn counters(&self) -> RelaySnapshot {
        self.counters.snapshot()
    }

    /// Breaker inspection, when the gate is enabled.
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Batch controller inspection, when dynamic batching is enabled.
    pub fn batch(&self) -> Option<BatchSnapshot> {
        self.batch.as_ref().map(|batch| batch.snapshot())
    }

    /// Spawn the relay loop onto the runtime and return its handle.
    pub fn spawn(self: Arc<Self>) -> RelayHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let join = tokio::spawn(async move { self.run(loop_token).await });
        RelayHandle { token, join }
    }

    /// Run until `shutdown` fires. The in-flight tick always completes; the
    /// grace window in [`RelayHandle::shutdown`] bounds how long that may
    /// take before the task is aborted outright.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            topic = %self.config.topic,
            dynamic_batching = self.config.dynamic_batching_enabled,
            circuit_breaker = self.config.circuit_breaker_enabled,
            "outbox relay starting"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(outcome) if outcome.polled > 0 => {
                            info!(
                                polled = outcome.polled,
                                published = outcome.published,
                                retried = outcome.retried,
                                failed = outcome.failed,
                                "relay tick complete"
                            );
                        }
                        Ok(_) => debug!("relay tick idle"),
                        Err(e) => error!(error = %e, "relay tick failed"),
                    }

                    if let Some(metrics) = &self.metrics {
                        if let Ok((pending, age)) = self.store.pending_stats().await {
                            metrics.pending.set(pending);
                            metrics.oldest_pending_age_seconds.set(age);
                        }
                    }
                }
            }
        }

        info!("outbox relay stopped");
    }

    /// One poll: claim due rows and forward them. Public so tests and
    /// embedders can drive the relay without the scheduler.
    pub async fn tick(&self) -> Result<TickOutcome, OutboxError> {
        let mut outcome = TickOutcome::default();

        // 1. Breaker gate. While open, the claim is skipped too: holding
        //    row locks with no broker to hand rows to is pure contention.
        let permit = match &self.breaker {
            Some(breaker) => match breaker.acquire() {
                Some(permit) => Some(permit),
                None => {
                    self.counters.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                    outcome.skipped_open = true;
                    debug!("circuit open, skipping tick");
                    return Ok(outcome);
                }
            },
            None => None,
        };

        // 2. Batch size; a half-open probe claims exactly one row.
        let limit = match permit {
            Some(Permit::Probe) => 1,
            _ => self
                .batch
                .as_ref()
                .map(|batch| batch.current())
                .unwrap_or(self.config.batch_size),
        };

        let result = self.claim_and_forward(limit, &mut outcome).await;

        // A probe that resolved nothing (idle claim, or the tick failed
        // before the send completed) is handed back so the next tick can
        // probe again.
        if permit == Some(Permit::Probe)
            && outcome.published + outcome.retried + outcome.failed == 0
        {
            if let Some(breaker) = &self.breaker {
                breaker.release_probe();
            }
        }

        result.map(|_| outcome)
    }

    async fn claim_and_forward(
        &self,
        limit: i64,
        outcome: &mut TickOutcome,
    ) -> Result<(), OutboxError> {
        // 3. Claim under skip-locked row locks.
        let mut claim = self.store.begin().await?;
        let mut rows = claim.lock_pending(self.clock.now(), limit).await?;
        outcome.polled = rows.len();

        if rows.is_empty() {
            claim.commit().await?;
            self.counters.idle_ticks.fetch_add(1, Ordering::Relaxed);
            if let Some(batch) = &self.batch {
                batch.record_idle();
            }
            return Ok(());
        }

        self.counters
            .polled
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.polled.inc_by(rows.len() as u64);
        }

        // 4. Forward in claim order (occurred_at ASC).
        let mut any_failure = false;
        for row in rows.iter_mut() {
            match self.send_row(row).await {
                Ok(ack) => {
                    row.mark_published(self.clock.now())?;
                    claim.save(row).await?;
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    outcome.published += 1;
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                    if let Some(metrics) = &self.metrics {
                        metrics.published.inc();
                    }
                    debug!(
                        event_id = %row.event_id(),
                        partition = ack.partition,
                        offset = ack.offset,
                        "outbox row published"
                    );
                }
                Err(err) => {
                    any_failure = true;
                    self.handle_send_failure(row, &err, outcome)?;
                    claim.save(row).await?;
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                }
            }
        }

        // 5. Commit the tick: state changes land, row locks release.
        claim.commit().await?;

        if let Some(batch) = &self.batch {
            if any_failure {
                batch.record_failure();
            } else {
                batch.record_success();
            }
        }

        Ok(())
    }

    fn handle_send_failure(
        &self,
        row: &mut OutboxEvent,
        err: &BrokerError,
        outcome: &mut TickOutcome,
    ) -> Result<(), OutboxError> {
        let now = self.clock.now();

        if row.retry_count() >= self.config.max_retries {
            row.mark_failed(&err.to_string())?;
            outcome.failed += 1;
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.failed.inc();
            }
            error!(
                event_id = %row.event_id(),
                retry_count = row.retry_count(),
                error = %err,
                "outbox row exhausted retries, marked FAILED (operator action required)"
            );
        } else {
            let backoff = backoff_for(
                row.retry_count(),
                self.config.backoff_base,
                self.config.backoff_cap,
            );
            row.schedule_retry(now, backoff, &err.to_string())?;
            outcome.retried += 1;
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.retried.inc();
            }
            warn!(
                event_id = %row.event_id(),
                retry_count = row.retry_count(),
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "outbox row delivery failed, retry scheduled"
            );
        }
        Ok(())
    }

    async fn send_row(&self, row: &OutboxEvent) -> Result<BrokerAck, BrokerError> {
        let record = BrokerRecord::new(
            &self.config.topic,
            row.event_id().as_str(),
            row.payload(),
        )
        .header("event_id", row.event_id().as_str())
        .header("event_type", row.event_type())
        .header("aggregate_type", row.aggregate_type())
        .header("aggregate_id", row.aggregate_id())
        .header("occurred_at", row.occurred_at().to_rfc3339())
        .headers(correlation_headers(row.payload()));

        self.broker.send(record, self.config.send_timeout).await
    }
}

/// Exponential backoff for the next retry: `min(2^retry_count * base, cap)`.
pub fn backoff_for(retry_count: i32, base: Duration, cap: Duration) -> Duration {
    let exponent = retry_count.clamp(0, 30) as u32;
    let millis = (base.as_millis() as u64).saturating_mul(1u64 << exponent);
    Duration::from_millis(millis).min(cap)
}

/// Handle to a spawned relay loop.
pub struct RelayHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl RelayHandle {
    /// Graceful shutdown: stop scheduling ticks, give the in-flight tick
    /// `grace` to commit or roll back, then abort outstanding sends.
    pub async fn shutdown(mut self, grace: Duration) {
        self.token.cancel();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => info!("outbox relay shut down cleanly"),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "grace period elapsed, aborting in-flight relay tick"
                );
                self.join.abort();
            }
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
