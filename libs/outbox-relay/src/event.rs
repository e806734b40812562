//! Durable outbox rows and their lifecycle state machine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use event_id::EventId;

/// Longest error text persisted per row.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 500;

/// Lifecycle state of an outbox row.
///
/// `Pending` rows cycle through retries; `Published` and `Failed` are
/// terminal and only the cleanup job (respectively an operator) touches
/// them afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboxStatus::Pending)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// Attempted transition out of a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: OutboxStatus,
    pub to: OutboxStatus,
}

/// One durable queue entry.
///
/// Created by the writer inside the caller's transaction, owned by the
/// store afterwards, and mutated only through the transition methods below
/// while the relay holds the row lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    event_id: EventId,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: String,
    occurred_at: DateTime<Utc>,
    status: OutboxStatus,
    retry_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    version: Option<i64>,
}

impl OutboxEvent {
    /// A fresh row: `PENDING`, eligible for its first delivery attempt
    /// immediately (`next_retry_at = occurred_at`).
    pub fn pending(
        event_id: EventId,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload: payload.into(),
            occurred_at,
            status: OutboxStatus::Pending,
            retry_count: 0,
            next_retry_at: Some(occurred_at),
            published_at: None,
            error_message: None,
            version: None,
        }
    }

    /// Rehydrate a row from storage. No transition checks: the database is
    /// the authority on persisted state.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_columns(
        event_id: EventId,
        aggregate_type: String,
        aggregate_id: String,
        event_type: String,
        payload: String,
        occurred_at: DateTime<Utc>,
        status: OutboxStatus,
        retry_count: i32,
        next_retry_at: Option<DateTime<Utc>>,
        published_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
        version: Option<i64>,
    ) -> Self {
        Self {
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
            version,
        }
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn status(&self) -> OutboxStatus {
        self.status
    }

    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_pending(&self, to: OutboxStatus) -> Result<(), InvalidTransition> {
        if self.status != OutboxStatus::Pending {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// Successful broker hand-off: terminal `PUBLISHED`.
    pub fn mark_published(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.ensure_pending(OutboxStatus::Published)?;
        self.status = OutboxStatus::Published;
        self.published_at = Some(now);
        self.next_retry_at = None;
        self.error_message = None;
        Ok(())
    }

    /// Failed attempt with retry budget remaining: stays `PENDING`, bumps
    /// the retry counter and schedules the next attempt.
    pub fn schedule_retry(
        &mut self,
        now: DateTime<Utc>,
        backoff: Duration,
        error: &str,
    ) -> Result<(), InvalidTransition> {
        self.ensure_pending(OutboxStatus::Pending)?;
        self.retry_count += 1;
        self.next_retry_at =
            Some(now + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero()));
        self.error_message = Some(truncate_error(error));
        Ok(())
    }

    /// Retry budget exhausted: terminal `FAILED`, awaiting operator action.
    pub fn mark_failed(&mut self, error: &str) -> Result<(), InvalidTransition> {
        self.ensure_pending(OutboxStatus::Failed)?;
        self.status = OutboxStatus::Failed;
        self.next_retry_at = None;
        self.error_message = Some(truncate_error(error));
        Ok(())
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(ERROR_MESSAGE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> OutboxEvent {
        OutboxEvent::pending(
            EventId::new("1001").unwrap(),
            "Order",
            "O-1",
            "ORDER_CREATED",
            "{}",
            Utc::now(),
        )
    }

    #[test]
    fn fresh_rows_are_immediately_eligible() {
        let event = row();
        assert_eq!(event.status(), OutboxStatus::Pending);
        assert_eq!(event.retry_count(), 0);
        assert_eq!(event.next_retry_at(), Some(event.occurred_at()));
        assert_eq!(event.published_at(), None);
        assert_eq!(event.version(), None);
    }

    #[test]
    fn publish_clears_retry_state() {
        let mut event = row();
        let now = Utc::now();
        event.schedule_retry(now, Duration::from_secs(1), "boom").unwrap();

        event.mark_published(now).unwrap();

        assert_eq!(event.status(), OutboxStatus::Published);
        assert_eq!(event.published_at(), Some(now));
        assert_eq!(event.next_retry_at(), None);
        assert_eq!(event.error_message(), None);
    }

    #[test]
    fn retry_bumps_counter_and_schedules() {
        let mut event = row();
        let now = Utc::now();

        event.schedule_retry(now, Duration::from_secs(2), "broker down").unwrap();

        assert_eq!(event.status(), OutboxStatus::Pending);
        assert_eq!(event.retry_count(), 1);
        assert_eq!(
            event.next_retry_at(),
            Some(now + chrono::Duration::seconds(2))
        );
        assert_eq!(event.error_message(), Some("broker down"));
    }

    #[test]
    fn failed_is_terminal_without_retry_schedule() {
        let mut event = row();
        event.mark_failed("gave up").unwrap();

        assert_eq!(event.status(), OutboxStatus::Failed);
        assert_eq!(event.next_retry_at(), None);
        assert!(event.is_terminal());
    }

    #[test]
    fn terminal_rows_refuse_further_transitions() {
        let now = Utc::now();

        let mut published = row();
        published.mark_published(now).unwrap();
        assert_eq!(
            published.mark_failed("late failure"),
            Err(InvalidTransition {
                from: OutboxStatus::Published,
                to: OutboxStatus::Failed,
            })
        );

        let mut failed = row();
        failed.mark_failed("boom").unwrap();
        assert!(failed.mark_published(now).is_err());
        assert!(failed
            .schedule_retry(now, Duration::from_secs(1), "boom")
            .is_err());
    }

    #[test]
    fn error_messages_are_truncated_to_500_chars() {
        let mut event = row();
        let long = "x".repeat(2_000);
        event.schedule_retry(Utc::now(), Duration::from_secs(1), &long).unwrap();
        assert_eq!(event.error_message().unwrap().chars().count(), 500);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert!("RETRYING".parse::<OutboxStatus>().is_err());
    }
}
