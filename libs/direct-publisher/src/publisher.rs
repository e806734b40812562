//! The direct publish path.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use event_broker::{BrokerClient, BrokerError, BrokerRecord};
use event_envelope::{
    Envelope, EnvelopeError, EnvelopeFactory, EnvelopeSerializer, EventPayload, EventValidator,
    InvalidEvent, JsonEnvelopeSerializer, Severity, StructuralValidator, TransformerPipeline,
};
use event_id::{Clock, EventId, SystemClock};
use resilience::{with_retry, RetryError};

use crate::config::PublisherConfig;
use crate::dlq::FailedEventRecord;

/// Errors surfaced by [`DirectPublisher::publish`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Invalid(#[from] InvalidEvent),

    /// Retry budget exhausted. The event was handed to the dead-letter
    /// pipeline (broker DLQ, or the local backup file when that failed too).
    #[error("delivery of {event_id} failed after {attempts} attempts: {last}")]
    Exhausted {
        event_id: EventId,
        attempts: u32,
        last: BrokerError,
    },
}

/// Fast-path publisher: no outbox row, no transactional guarantee, retries
/// in memory and dead-letters on exhaustion.
pub struct DirectPublisher {
    factory: EnvelopeFactory,
    validator: Arc<dyn EventValidator>,
    pipeline: TransformerPipeline,
    serializer: Arc<dyn EnvelopeSerializer>,
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn Clock>,
    config: PublisherConfig,
}

impl DirectPublisher {
    pub fn new(
        factory: EnvelopeFactory,
        broker: Arc<dyn BrokerClient>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            factory,
            validator: Arc::new(StructuralValidator),
            pipeline: TransformerPipeline::new(),
            serializer: Arc::new(JsonEnvelopeSerializer),
            broker,
            clock: Arc::new(SystemClock),
            config,
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

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Assemble, validate and deliver `payload`. Returns the minted event
    /// id once the broker acknowledges it.
    pub async fn publish<P>(&self, payload: &P, severity: Severity) -> Result<EventId, PublishError>
    where
        P: EventPayload + 'static,
    {
        let envelope = self.factory.assemble(payload, severity)?;
        self.validator.validate(&envelope)?;
        let envelope = self.pipeline.apply(envelope)?;
        let raw = self.serializer.serialize(&envelope)?;
        let event_id = envelope.event_id().clone();

        let record = self.record_for(&envelope, &raw);
        let send_timeout = self.config.send_timeout;
        let broker = self.broker.clone();

        let result = with_retry(self.config.retry.clone(), || {
            let record = record.clone();
            let broker = broker.clone();
            async move { broker.send(record, send_timeout).await }
        })
        .await;

        match result {
            Ok(ack) => {
                info!(
                    event_id = %event_id,
                    topic = %self.config.topic,
                    partition = ack.partition,
                    offset = ack.offset,
                    "event published"
                );
                Ok(event_id)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(
                    event_id = %event_id,
                    attempts,
                    error = %last,
                    "delivery exhausted, routing to dead letter"
                );

                let failed = FailedEventRecord::from_broker_error(
                    &event_id,
                    &self.config.topic,
                    &raw,
                    &last,
                    self.clock.now().timestamp_millis(),
                );
                self.dead_letter(failed).await;

                Err(PublishError::Exhausted {
                    event_id,
                    attempts,
                    last,
                })
            }
        }
    }

    fn record_for(&self, envelope: &Envelope, raw: &str) -> BrokerRecord {
        let source = &envelope.metadata().source;
        let mut record = BrokerRecord::new(
            &self.config.topic,
            envelope.event_id().as_str(),
            raw,
        )
        .header("event_id", envelope.event_id().as_str())
        .header("event_type", envelope.event_type());

        for (key, value) in [
            ("correlation_id", &source.correlation_id),
            ("causation_id", &source.causation_id),
            ("root_event_id", &source.root_event_id),
        ] {
            if let Some(value) = value {
                record = record.header(key, value);
            }
        }
        record
    }

    /// Synchronous dead-letter hand-off. The fire-and-forget variant loses
    /// events when the DLQ send itself fails; this one waits for the ack
    /// and falls back to a local file.
    async fn dead_letter(&self, failed: FailedEventRecord) {
        let json = match serde_json::to_string(&failed) {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %failed.event_id, error = %e, "dead-letter record unserializable");
                return;
            }
        };

        let record = BrokerRecord::new(&self.config.dlq_topic, &failed.event_id, &json);
        match self.broker.send(record, self.config.send_timeout).await {
            Ok(_) => {
                info!(
                    event_id = %failed.event_id,
                    dlq_topic = %self.config.dlq_topic,
                    "event routed to dead-letter topic"
                );
            }
            Err(e) => {
                warn!(
                    event_id = %failed.event_id,
                    error = %e,
                    "dead-letter send failed, writing local backup"
                );
                match self.backup_to_file(&failed, &json).await {
                    Ok(path) => info!(
                        event_id = %failed.event_id,
                        path = %path.display(),
                        "failed event backed up locally"
                    ),
                    Err(io) => error!(
                        event_id = %failed.event_id,
                        error = %io,
                        "local backup failed; event requires manual recovery from logs"
                    ),
                }
            }
        }
    }

    async fn backup_to_file(
        &self,
        failed: &FailedEventRecord,
        json: &str,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config.backup_dir).await?;
        let path = self.config.backup_dir.join(failed.backup_file_name());
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}
