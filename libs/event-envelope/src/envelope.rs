use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use event_id::{Clock, EventId, EventIdGenerator, IdError};

use crate::metadata::{Metadata, SchemaInfo};
use crate::provider::MetadataProvider;
use crate::validator::InvalidEvent;

/// Business impact classification of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

/// Contract for business payloads carried inside an [`Envelope`].
///
/// A payload self-reports its event type; schema identity defaults to the
/// simple type name at version 1 and may be overridden per type.
pub trait EventPayload: Serialize + Send + Sync {
    fn event_type(&self) -> &str;

    fn schema() -> SchemaInfo
    where
        Self: Sized,
    {
        SchemaInfo::fallback(simple_type_name::<Self>())
    }
}

/// Last path segment of a type name (`my_crate::events::OrderCreated` →
/// `OrderCreated`).
pub(crate) fn simple_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Immutable event record: payload plus identity, timing and context.
///
/// Fields are private; the only mutation surface is the consuming
/// `with_*` builders used by envelope transformers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    event_id: EventId,
    event_type: String,
    severity: Severity,
    metadata: Metadata,
    payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
    published_at: DateTime<Utc>,
}

impl Envelope {
    /// Assemble from already-resolved parts. [`EnvelopeFactory::assemble`]
    /// is the normal entry point; this exists for deserialization paths and
    /// tests, and performs no validation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        event_id: EventId,
        event_type: impl Into<String>,
        severity: Severity,
        metadata: Metadata,
        payload: serde_json::Value,
        occurred_at: DateTime<Utc>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            severity,
            metadata,
            payload,
            occurred_at,
            published_at,
        }
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Errors raised while assembling or transforming envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("id generation failed: {0}")]
    Id(#[from] IdError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] InvalidEvent),

    #[error("transformer {stage} failed: {reason}")]
    Transform { stage: String, reason: String },
}

/// Stamps identity, timing and metadata onto payloads.
///
/// `occurred_at` and `published_at` are both taken from the injected clock
/// at assembly time; the relay later records actual broker hand-off in the
/// outbox row, not in the envelope.
pub struct EnvelopeFactory {
    ids: Arc<EventIdGenerator>,
    clock: Arc<dyn Clock>,
    metadata: Arc<MetadataProvider>,
}

impl EnvelopeFactory {
    pub fn new(
        ids: Arc<EventIdGenerator>,
        clock: Arc<dyn Clock>,
        metadata: Arc<MetadataProvider>,
    ) -> Self {
        Self {
            ids,
            clock,
            metadata,
        }
    }

    pub fn assemble<P>(&self, payload: &P, severity: Severity) -> Result<Envelope, EnvelopeError>
    where
        P: EventPayload + 'static,
    {
        let event_id = self.ids.generate()?;
        let now = self.clock.now();
        let metadata = self.metadata.current_metadata::<P>();
        let value = serde_json::to_value(payload)?;

        Ok(Envelope::from_parts(
            event_id,
            payload.event_type(),
            severity,
            metadata,
            value,
            now,
            now,
        ))
    }
}
