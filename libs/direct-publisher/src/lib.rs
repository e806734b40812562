//! # Direct Publisher
//!
//! Non-outbox fast path for callers that do not need transactional
//! atomicity: assemble the envelope, validate it, serialize, and hand it to
//! the broker with attempt-count retry. Exhausted deliveries are routed to
//! a dead-letter topic with a **synchronous** send; if the dead-letter send
//! fails as well, the record is appended to a local backup file named
//! `{event_id}.json` so nothing is silently lost.
//!
//! The publisher shares the envelope factory, validator, transformer
//! pipeline and serializer with the outbox writer — same envelope, a
//! different delivery contract.
//!
//! ```rust,no_run
//! use direct_publisher::{DirectPublisher, PublisherConfig};
//! use event_broker::KafkaBrokerClient;
//! use event_envelope::{EventPayload, Severity};
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Serialize)]
//! struct CacheWarmed {
//!     keys: u64,
//! }
//!
//! impl EventPayload for CacheWarmed {
//!     fn event_type(&self) -> &str {
//!         "CACHE_WARMED"
//!     }
//! }
//!
//! # async fn demo(publisher: DirectPublisher) -> anyhow::Result<()> {
//! let event_id = publisher
//!     .publish(&CacheWarmed { keys: 10_000 }, Severity::Info)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dlq;
mod publisher;

pub use config::PublisherConfig;
pub use dlq::FailedEventRecord;
pub use publisher::{DirectPublisher, PublishError};
