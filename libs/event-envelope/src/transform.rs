//! Envelope transformation and serialization.
//!
//! Transformers are pure `Envelope -> Envelope` functions composed into a
//! pipeline that runs before the outbox write and before a direct publish.
//! This is the hook point for concerns like PII masking; the library ships
//! [`TagRedactor`] as a working example and leaves domain-specific
//! transformers to the host application.

use std::sync::Arc;

use crate::envelope::{Envelope, EnvelopeError};

/// One stage of the pre-write pipeline.
pub trait EnvelopeTransformer: Send + Sync {
    /// Stable stage name, used in error reporting.
    fn name(&self) -> &str;

    fn transform(&self, envelope: Envelope) -> Result<Envelope, EnvelopeError>;
}

/// Ordered composition of transformers. Empty pipelines are the common case
/// and pass envelopes through untouched.
#[derive(Default, Clone)]
pub struct TransformerPipeline {
    stages: Vec<Arc<dyn EnvelopeTransformer>>,
}

impl TransformerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Arc<dyn EnvelopeTransformer>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn apply(&self, envelope: Envelope) -> Result<Envelope, EnvelopeError> {
        self.stages
            .iter()
            .try_fold(envelope, |acc, stage| stage.transform(acc))
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

/// Replaces the values of selected tags before the envelope leaves the
/// process.
pub struct TagRedactor {
    keys: Vec<String>,
}

impl TagRedactor {
    pub const MASK: &'static str = "***";

    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

impl EnvelopeTransformer for TagRedactor {
    fn name(&self) -> &str {
        "tag-redactor"
    }

    fn transform(&self, envelope: Envelope) -> Result<Envelope, EnvelopeError> {
        let mut tags = envelope.metadata().tags().clone();
        for key in &self.keys {
            if let Some(value) = tags.get_mut(key) {
                *value = Self::MASK.to_string();
            }
        }
        let metadata = envelope.metadata().clone().with_tags(tags);
        Ok(envelope.with_metadata(metadata))
    }
}

/// Envelope wire format.
pub trait EnvelopeSerializer: Send + Sync {
    fn serialize(&self, envelope: &Envelope) -> Result<String, EnvelopeError>;
    fn deserialize(&self, raw: &str) -> Result<Envelope, EnvelopeError>;
}

/// The default JSON wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEnvelopeSerializer;

impl EnvelopeSerializer for JsonEnvelopeSerializer {
    fn serialize(&self, envelope: &Envelope) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(envelope)?)
    }

    fn deserialize(&self, raw: &str) -> Result<Envelope, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::metadata::{Actor, Metadata, SchemaInfo, Source, Trace};
    use crate::Severity;
    use event_id::EventId;

    fn envelope_with_tags(tags: BTreeMap<String, String>) -> Envelope {
        let now = Utc::now();
        Envelope::from_parts(
            EventId::new("77").unwrap(),
            "SAMPLE",
            Severity::Info,
            Metadata::new(
                Source {
                    service: "svc".into(),
                    environment: "test".into(),
                    instance_id: "i-1".into(),
                    host: "localhost".into(),
                    version: "0.1.0".into(),
                    correlation_id: Some("c-1".into()),
                    causation_id: None,
                    root_event_id: None,
                },
                Actor::system("127.0.0.1"),
                Trace {
                    trace_id: "t".into(),
                    span_id: "s".into(),
                    correlation_id: Some("c-1".into()),
                },
                SchemaInfo::new("Sample", 1),
                tags,
            ),
            json!({"amount": 12}),
            now,
            now,
        )
    }

    #[test]
    fn json_round_trip_preserves_envelope() {
        let mut tags = BTreeMap::new();
        tags.insert("tenant".to_string(), "acme".to_string());
        tags.insert("region".to_string(), "eu".to_string());
        let envelope = envelope_with_tags(tags);

        let serializer = JsonEnvelopeSerializer;
        let raw = serializer.serialize(&envelope).unwrap();
        let back = serializer.deserialize(&raw).unwrap();

        assert_eq!(back, envelope);
    }

    #[test]
    fn redactor_masks_only_selected_tags() {
        let mut tags = BTreeMap::new();
        tags.insert("tenant".to_string(), "acme".to_string());
        tags.insert("region".to_string(), "eu".to_string());
        let envelope = envelope_with_tags(tags);

        let pipeline = TransformerPipeline::new()
            .with_stage(Arc::new(TagRedactor::new(vec!["tenant".to_string()])));
        let transformed = pipeline.apply(envelope).unwrap();

        let tags = transformed.metadata().tags();
        assert_eq!(tags.get("tenant").map(String::as_str), Some(TagRedactor::MASK));
        assert_eq!(tags.get("region").map(String::as_str), Some("eu"));
    }

    #[test]
    fn pipeline_applies_stages_in_order() {
        struct Rename(&'static str);
        impl EnvelopeTransformer for Rename {
            fn name(&self) -> &str {
                "rename"
            }
            fn transform(&self, envelope: Envelope) -> Result<Envelope, EnvelopeError> {
                Ok(envelope.with_payload(json!({ "step": self.0 })))
            }
        }

        let pipeline = TransformerPipeline::new()
            .with_stage(Arc::new(Rename("first")))
            .with_stage(Arc::new(Rename("second")));

        let out = pipeline.apply(envelope_with_tags(BTreeMap::new())).unwrap();
        assert_eq!(out.payload()["step"], "second");
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let envelope = envelope_with_tags(BTreeMap::new());
        let out = TransformerPipeline::new().apply(envelope.clone()).unwrap();
        assert_eq!(out, envelope);
    }
}
