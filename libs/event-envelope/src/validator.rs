use thiserror::Error;

use crate::envelope::Envelope;

/// A structurally broken envelope. Always surfaced to the caller, never
/// logged and swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event: {0}")]
pub struct InvalidEvent(pub String);

/// Structural envelope validation.
///
/// The default method carries the canonical checks; implementations only
/// override when they need to layer additional rules on top.
pub trait EventValidator: Send + Sync {
    fn validate(&self, envelope: &Envelope) -> Result<(), InvalidEvent> {
        validate_default(envelope)
    }
}

/// The canonical structural checks: all required fields present and
/// `occurred_at <= published_at`. Anything stricter is the caller's
/// responsibility.
pub fn validate_default(envelope: &Envelope) -> Result<(), InvalidEvent> {
    if envelope.event_id().as_str().trim().is_empty() {
        return Err(InvalidEvent("eventId must not be blank".to_string()));
    }
    if envelope.event_type().trim().is_empty() {
        return Err(InvalidEvent("eventType must not be blank".to_string()));
    }
    if envelope.metadata().source.service.trim().is_empty() {
        return Err(InvalidEvent("source.service must not be blank".to_string()));
    }
    if envelope.metadata().schema.version < 1 {
        return Err(InvalidEvent("schema.version must be at least 1".to_string()));
    }
    if envelope.payload().is_null() {
        return Err(InvalidEvent("payload must not be null".to_string()));
    }
    if envelope.occurred_at() > envelope.published_at() {
        return Err(InvalidEvent(format!(
            "occurredAt {} is after publishedAt {}",
            envelope.occurred_at(),
            envelope.published_at()
        )));
    }
    Ok(())
}

/// Stock validator applying exactly the canonical checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl EventValidator for StructuralValidator {}
