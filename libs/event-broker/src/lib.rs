//! # Event Broker
//!
//! Synchronous, bounded-timeout send abstraction over the message broker.
//!
//! The [`BrokerClient`] port is what the relay and the direct publisher
//! program against; [`KafkaBrokerClient`] is the production implementation.
//! A `send` resolves only after the broker has acknowledged the record —
//! returning earlier would break the at-least-once contract the outbox
//! relies on.

mod error;
mod kafka;
mod record;

pub use error::BrokerError;
pub use kafka::{idempotent_producer_config, KafkaBrokerClient};
pub use record::{correlation_headers, BrokerAck, BrokerRecord};

use std::time::Duration;

use async_trait::async_trait;

/// Broker port. Implementations must be safe to call concurrently and must
/// not resolve before broker acknowledgement.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Deliver one record, waiting at most `timeout` for the acknowledgement.
    async fn send(&self, record: BrokerRecord, timeout: Duration) -> Result<BrokerAck, BrokerError>;
}
