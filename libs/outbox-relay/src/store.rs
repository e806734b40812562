//! Outbox persistence contract and the PostgreSQL implementation.
//!
//! The relay's tick runs inside one storage transaction: [`OutboxStore::begin`]
//! opens an [`OutboxClaim`], `lock_pending` selects due rows under
//! `FOR UPDATE SKIP LOCKED`, per-row outcomes are written back through
//! `save`, and `commit` releases the locks. Skip-locked claiming is what
//! lets relay replicas run side by side without double-publishing: the lock
//! blocks other writers of the same row and concurrent claimers skip rather
//! than wait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::debug;

use event_id::EventId;

use crate::error::{StoreError, StoreResult};
use crate::event::{OutboxEvent, OutboxStatus};

/// Durable persistence port for outbox rows.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Open the claim transaction for one relay tick.
    async fn begin(&self) -> StoreResult<Box<dyn OutboxClaim>>;

    /// All rows of one aggregate, oldest first.
    async fn find_by_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> StoreResult<Vec<OutboxEvent>>;

    /// Read-only snapshot by status, oldest first.
    async fn find_by_status(
        &self,
        status: OutboxStatus,
        limit: i64,
    ) -> StoreResult<Vec<OutboxEvent>>;

    /// Batch cleanup; returns the number of rows removed.
    async fn delete_by_status_and_occurred_before(
        &self,
        status: OutboxStatus,
        before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<u64>;

    async fn count_by_status(&self, status: OutboxStatus) -> StoreResult<i64>;

    async fn count(&self) -> StoreResult<i64>;

    /// Pending count and oldest pending age in seconds (0 when none pending).
    async fn pending_stats(&self) -> StoreResult<(i64, i64)>;
}

/// The unit of work held open for the duration of one tick.
#[async_trait]
pub trait OutboxClaim: Send {
    /// Claim due rows: `PENDING`, `next_retry_at <= now`, oldest first,
    /// locked with skip-locked semantics so concurrent relays never claim
    /// the same row.
    async fn lock_pending(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<OutboxEvent>>;

    /// Write a claimed row's new state inside the claim transaction.
    async fn save(&mut self, event: &OutboxEvent) -> StoreResult<()>;

    /// Commit the tick: row updates become visible and locks release.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

const SELECT_COLUMNS: &str = "event_id, aggregate_type, aggregate_id, event_type, payload, \
     occurred_at, status, retry_count, next_retry_at, published_at, error_message, version";

/// SQLx-backed store over PostgreSQL.
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert one row. Takes any executor so the writer can run it inside
    /// the caller's transaction; if that transaction rolls back, the row
    /// was never there.
    pub async fn save<'e, E>(&self, executor: E, event: &OutboxEvent) -> StoreResult<()>
    where
        E: PgExecutor<'e>,
    {
        save_with(executor, event).await
    }

    /// Operator replay: reset FAILED rows that occurred since `since` back
    /// to PENDING with a fresh retry budget. Returns rows reset.
    ///
    /// This is the one sanctioned bypass of the terminal-state rule, and it
    /// exists for exactly the case the relay cannot solve on its own: rows
    /// that exhausted their retries against a now-recovered broker.
    pub async fn replay_failed_since(&self, since: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'PENDING',
                retry_count = 0,
                next_retry_at = NOW(),
                error_message = NULL
            WHERE status = 'FAILED' AND occurred_at >= $1
            "#,
        )
        .bind(since)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Operator replay of a single FAILED row by event id.
    pub async fn replay_failed(&self, event_id: &EventId) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'PENDING',
                retry_count = 0,
                next_retry_at = NOW(),
                error_message = NULL
            WHERE status = 'FAILED' AND event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn save_with<'e, E>(executor: E, event: &OutboxEvent) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO outbox_events (
            event_id,
            aggregate_type,
            aggregate_id,
            event_type,
            payload,
            occurred_at,
            status,
            retry_count,
            next_retry_at,
            published_at,
            error_message,
            version
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (event_id) DO UPDATE SET
            status = EXCLUDED.status,
            retry_count = EXCLUDED.retry_count,
            next_retry_at = EXCLUDED.next_retry_at,
            published_at = EXCLUDED.published_at,
            error_message = EXCLUDED.error_message,
            version = COALESCE(outbox_events.version, 0) + 1
        "#,
    )
    .bind(event.event_id().as_str())
    .bind(event.aggregate_type())
    .bind(event.aggregate_id())
    .bind(event.event_type())
    .bind(event.payload())
    .bind(event.occurred_at())
    .bind(event.status().as_str())
    .bind(event.retry_count())
    .bind(event.next_retry_at())
    .bind(event.published_at())
    .bind(event.error_message())
    .bind(event.version())
    .execute(executor)
    .await?;

    debug!(
        event_id = %event.event_id(),
        status = %event.status(),
        "outbox row saved"
    );
    Ok(())
}

fn map_row(row: PgRow) -> StoreResult<OutboxEvent> {
    let event_id: String = row.try_get("event_id")?;
    let event_id = EventId::new(event_id).map_err(|e| StoreError::Decode(e.to_string()))?;

    let status: String = row.try_get("status")?;
    let status: OutboxStatus = status.parse().map_err(StoreError::Decode)?;

    Ok(OutboxEvent::from_columns(
        event_id,
        row.try_get("aggregate_type")?,
        row.try_get("aggregate_id")?,
        row.try_get("event_type")?,
        row.try_get("payload")?,
        row.try_get("occurred_at")?,
        status,
        row.try_get("retry_count")?,
        row.try_get("next_retry_at")?,
        row.try_get("published_at")?,
        row.try_get("error_message")?,
        row.try_get("version")?,
    ))
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn begin(&self) -> StoreResult<Box<dyn OutboxClaim>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOutboxClaim { tx }))
    }

    async fn find_by_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> StoreResult<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS}
             FROM outbox_events
             WHERE aggregate_type = $1 AND aggregate_id = $2
             ORDER BY occurred_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(map_row).collect()
    }

    async fn find_by_status(
        &self,
        status: OutboxStatus,
        limit: i64,
    ) -> StoreResult<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS}
             FROM outbox_events
             WHERE status = $1
             ORDER BY occurred_at ASC
             LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(map_row).collect()
    }

    async fn delete_by_status_and_occurred_before(
        &self,
        status: OutboxStatus,
        before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox_events
            WHERE event_id IN (
                SELECT event_id
                FROM outbox_events
                WHERE status = $1 AND occurred_at < $2
                ORDER BY occurred_at ASC
                LIMIT $3
            )
            "#,
        )
        .bind(status.as_str())
        .bind(before)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn pending_stats(&self) -> StoreResult<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(occurred_at)))::BIGINT, 0) AS age_seconds
            FROM outbox_events
            WHERE status = 'PENDING'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = row.try_get("pending")?;
        let age: i64 = row.try_get("age_seconds")?;
        Ok((pending, age))
    }
}

/// One tick's transaction against PostgreSQL.
pub struct PgOutboxClaim {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OutboxClaim for PgOutboxClaim {
    async fn lock_pending(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS}
             FROM outbox_events
             WHERE status = 'PENDING' AND next_retry_at <= $1
             ORDER BY occurred_at ASC
             LIMIT $2
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;

        debug!(count = rows.len(), "claimed pending outbox rows");
        rows.into_iter().map(map_row).collect()
    }

    async fn save(&mut self, event: &OutboxEvent) -> StoreResult<()> {
        save_with(&mut *self.tx, event).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
