//! # Event Id Generation
//!
//! Time-sortable 64-bit event identifiers for the event publishing pipeline.
//!
//! Ids are Snowflake-shaped: `(millis since epoch) << 22 | worker << 12 | sequence`
//! with a custom epoch of 2024-01-01T00:00:00Z, a 10-bit worker id and a
//! 12-bit per-millisecond sequence. One generator instance hands out strictly
//! increasing ids, which gives the outbox table a natural insertion order
//! without a separate sequence column and allows coarse time-bucket sharding
//! downstream.
//!
//! ## Usage
//!
//! ```rust
//! use event_id::{EventIdGenerator, SystemClock, WorkerId};
//! use std::sync::Arc;
//!
//! let generator = EventIdGenerator::new(WorkerId::new(7).unwrap(), Arc::new(SystemClock));
//! let a = generator.generate().unwrap();
//! let b = generator.generate().unwrap();
//! assert_ne!(a, b);
//! ```
//!
//! The wall clock is injected through the [`Clock`] trait so tests can drive
//! the generator deterministically with [`ManualClock`].

mod clock;
mod error;
mod generator;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::IdError;
pub use generator::{EventId, EventIdGenerator, CUSTOM_EPOCH_MS};
pub use worker::{IdGeneratorConfig, WorkerId};
