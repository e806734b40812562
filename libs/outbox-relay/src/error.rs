//! Error types for the outbox relay.

use thiserror::Error;

use event_broker::BrokerError;
use event_envelope::{EnvelopeError, InvalidEvent};

use crate::event::InvalidTransition;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by the outbox store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Event not found in the outbox
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// A persisted row no longer maps onto the model
    #[error("row decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether a later attempt could plausibly succeed. Writer-side errors
    /// abort the caller's transaction either way; relay-side errors fail the
    /// tick and the next tick retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

/// Top-level error for writer and relay operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Invalid(#[from] InvalidEvent),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Misconfiguration: surfaced to the caller regardless of error policy.
    #[error("configuration error: {0}")]
    Config(String),
}
