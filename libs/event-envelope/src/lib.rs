//! # Event Envelope
//!
//! Immutable event wrapping with context capture for the event publishing
//! pipeline. An [`Envelope`] binds a business payload to its identity
//! (event id), timing (occurred/published instants) and ambient
//! [`Metadata`] — who acted, where the process runs, the trace the request
//! belongs to, the payload schema, and free-form tags.
//!
//! Construction goes through the [`EnvelopeFactory`], which stamps the id
//! from the generator and both timestamps from the injected clock, then
//! captures metadata from the task-local [`DiagnosticContext`]. Validation
//! is structural only ([`EventValidator`]); anything stricter belongs to the
//! caller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_envelope::{
//!     EnvelopeFactory, EventPayload, MetadataProvider, Severity, SourceResolver,
//! };
//! use event_id::{EventIdGenerator, SystemClock, WorkerId};
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Serialize)]
//! struct OrderCreated {
//!     order_id: String,
//! }
//!
//! impl EventPayload for OrderCreated {
//!     fn event_type(&self) -> &str {
//!         "ORDER_CREATED"
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = SourceResolver::resolve("order-service", &["prod".into()], "1.4.2");
//! let factory = EnvelopeFactory::new(
//!     Arc::new(EventIdGenerator::new(WorkerId::new(1)?, Arc::new(SystemClock))),
//!     Arc::new(SystemClock),
//!     Arc::new(MetadataProvider::new(source)),
//! );
//!
//! let envelope = factory.assemble(&OrderCreated { order_id: "O-1".into() }, Severity::Info)?;
//! assert_eq!(envelope.event_type(), "ORDER_CREATED");
//! # Ok(())
//! # }
//! ```

mod context;
mod envelope;
mod metadata;
mod provider;
mod transform;
mod validator;

pub use context::{keys, propagate, ContextMap, DiagnosticContext};
pub use envelope::{Envelope, EnvelopeError, EnvelopeFactory, EventPayload, Severity};
pub use metadata::{Actor, Metadata, SchemaInfo, Source, Trace};
pub use provider::{
    ActorProvider, MetadataProvider, Principal, PrincipalSource, SchemaResolver, SourceResolver,
    TagProvider, TraceProvider,
};
pub use transform::{
    EnvelopeSerializer, EnvelopeTransformer, JsonEnvelopeSerializer, TagRedactor,
    TransformerPipeline,
};
pub use validator::{validate_default, EventValidator, InvalidEvent, StructuralValidator};
