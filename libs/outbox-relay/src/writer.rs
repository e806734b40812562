//! Transactional outbox writer.
//!
//! Called synchronously from application code that is already inside a
//! database transaction. Assembles and validates the envelope, runs the
//! transformer pipeline, serializes, and inserts a `PENDING` row — never
//! touching the broker. Atomicity with the business change is inherited
//! from the caller's transaction: commit makes the row durable, rollback
//! makes it vanish.

use std::sync::Arc;

use sqlx::{Postgres, Transaction};
use tracing::{debug, error};

use event_envelope::{
    EnvelopeFactory, EnvelopeSerializer, EventPayload, EventValidator, JsonEnvelopeSerializer,
    Severity, StructuralValidator, TransformerPipeline,
};
use event_id::EventId;

use crate::error::OutboxError;
use crate::event::OutboxEvent;
use crate::store::PgOutboxStore;

/// When, relative to the intercepted operation, the write was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Before,
    AfterReturning,
    After,
}

/// Per-write flags. Any facade — method interceptor, middleware, explicit
/// call — reduces to this.
#[derive(Debug, Clone)]
pub struct OutboxWrite<'a> {
    pub aggregate_type: &'a str,
    pub aggregate_id: &'a str,
    pub severity: Severity,
    pub phase: WritePhase,
    /// `true`: validation/serialization/store failures propagate so the
    /// surrounding transaction aborts. `false`: they are logged and the
    /// business operation proceeds without the event.
    pub fail_on_error: bool,
}

impl<'a> OutboxWrite<'a> {
    pub fn new(aggregate_type: &'a str, aggregate_id: &'a str) -> Self {
        Self {
            aggregate_type,
            aggregate_id,
            severity: Severity::Info,
            phase: WritePhase::AfterReturning,
            fail_on_error: true,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn phase(mut self, phase: WritePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }
}

/// Writes envelopes into the outbox inside the caller's transaction.
pub struct OutboxWriter {
    factory: EnvelopeFactory,
    validator: Arc<dyn EventValidator>,
    pipeline: TransformerPipeline,
    serializer: Arc<dyn EnvelopeSerializer>,
    store: PgOutboxStore,
}

impl OutboxWriter {
    pub fn new(factory: EnvelopeFactory, store: PgOutboxStore) -> Self {
        Self {
            factory,
            validator: Arc::new(StructuralValidator),
            pipeline: TransformerPipeline::new(),
            serializer: Arc::new(JsonEnvelopeSerializer),
            store,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn EventValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_pipeline(mut self, pipeline: TransformerPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn EnvelopeSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Record `payload` as a `PENDING` outbox row in the caller's
    /// transaction. Returns the minted event id, or `Ok(None)` when the
    /// write failed and `fail_on_error` is off.
    ///
    /// Blank aggregate metadata is a configuration error and propagates
    /// regardless of the flag: outbox mode without an aggregate cannot
    /// order anything.
    pub async fn write_outbox<P>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: &P,
        write: OutboxWrite<'_>,
    ) -> Result<Option<EventId>, OutboxError>
    where
        P: EventPayload + 'static,
    {
        if write.aggregate_type.trim().is_empty() || write.aggregate_id.trim().is_empty() {
            return Err(OutboxError::Config(
                "outbox write requires aggregate_type and aggregate_id".to_string(),
            ));
        }

        match self.try_write(tx, payload, &write).await {
            Ok(event_id) => Ok(Some(event_id)),
            Err(err) if write.fail_on_error => Err(err),
            Err(err) => {
                error!(
                    aggregate_type = write.aggregate_type,
                    aggregate_id = write.aggregate_id,
                    error = %err,
                    "outbox write failed, continuing without event (failOnError=false)"
                );
                Ok(None)
            }
        }
    }

    async fn try_write<P>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: &P,
        write: &OutboxWrite<'_>,
    ) -> Result<EventId, OutboxError>
    where
        P: EventPayload + 'static,
    {
        let envelope = self.factory.assemble(payload, write.severity)?;
        self.validator.validate(&envelope)?;
        let envelope = self.pipeline.apply(envelope)?;
        let raw = self.serializer.serialize(&envelope)?;

        let event = OutboxEvent::pending(
            envelope.event_id().clone(),
            write.aggregate_type,
            write.aggregate_id,
            envelope.event_type(),
            raw,
            envelope.occurred_at(),
        );
        self.store.save(&mut **tx, &event).await?;

        debug!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            aggregate_type = write.aggregate_type,
            aggregate_id = write.aggregate_id,
            phase = ?write.phase,
            "event recorded in outbox"
        );
        Ok(envelope.event_id().clone())
    }
}
