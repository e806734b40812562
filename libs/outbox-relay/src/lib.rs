//! # Transactional Outbox Relay
//!
//! Reliable event publishing for business services. A producing service
//! records domain events in its relational store as part of the same
//! transaction that mutates business state; the background relay then
//! forwards those events to the broker with at-least-once delivery, ordered
//! per aggregate, surviving broker outages, process crashes, clock
//! anomalies and concurrent relay replicas.
//!
//! ## How the pattern works
//!
//! 1. Business logic and the event row are written in one database
//!    transaction ([`OutboxWriter`]): either both commit or neither exists
//! 2. The relay ([`OutboxRelay`]) periodically claims `PENDING` rows under
//!    `FOR UPDATE SKIP LOCKED` and forwards them to the broker
//! 3. Rows are marked `PUBLISHED` only after broker acknowledgement;
//!    failures reschedule with exponential backoff until `FAILED`
//! 4. A cleanup job ([`CleanupJob`]) purges old `PUBLISHED` rows; `FAILED`
//!    rows wait for an operator
//!
//! Delivery is **at least once**: consumers must deduplicate on the event
//! id carried as the record key.
//!
//! ## Writing an event with the business change
//!
//! ```rust,no_run
//! use outbox_relay::{OutboxWrite, OutboxWriter};
//! use event_envelope::{EventPayload, Severity};
//! use serde::Serialize;
//! use sqlx::PgPool;
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
//! async fn create_order(
//!     pool: &PgPool,
//!     writer: &OutboxWriter,
//!     order_id: String,
//! ) -> anyhow::Result<()> {
//!     let mut tx = pool.begin().await?;
//!
//!     sqlx::query("INSERT INTO orders (id) VALUES ($1)")
//!         .bind(&order_id)
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     // Same transaction: the event exists iff the order does.
//!     writer
//!         .write_outbox(
//!             &mut tx,
//!             &OrderCreated { order_id: order_id.clone() },
//!             OutboxWrite::new("Order", &order_id).severity(Severity::Info),
//!         )
//!         .await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Running the relay
//!
//! ```rust,no_run
//! use outbox_relay::{OutboxConfig, OutboxRelay, PgOutboxStore, DEFAULT_SHUTDOWN_GRACE};
//! use event_broker::KafkaBrokerClient;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn main_() -> anyhow::Result<()> {
//! let pool = PgPool::connect("postgresql://localhost/app").await?;
//! let store = Arc::new(PgOutboxStore::new(pool));
//! let broker = Arc::new(KafkaBrokerClient::from_brokers("localhost:9092")?);
//!
//! let relay = Arc::new(OutboxRelay::new(store, broker, OutboxConfig::from_env()?));
//! let handle = relay.spawn();
//!
//! // ... on shutdown:
//! handle.shutdown(DEFAULT_SHUTDOWN_GRACE).await;
//! # Ok(())
//! # }
//! ```

mod batch;
mod cleanup;
mod config;
mod error;
mod event;
mod expr;
mod metrics;
mod relay;
mod store;
mod writer;

pub use batch::{BatchConfig, BatchController, BatchSnapshot};
pub use cleanup::CleanupJob;
pub use config::OutboxConfig;
pub use error::{OutboxError, StoreError, StoreResult};
pub use event::{
    InvalidTransition, OutboxEvent, OutboxStatus, ERROR_MESSAGE_MAX_CHARS,
};
pub use expr::{AggregateIdExpr, CallContext, ExprError};
pub use metrics::OutboxMetrics;
pub use relay::{
    backoff_for, OutboxRelay, RelayHandle, RelaySnapshot, TickOutcome, DEFAULT_SHUTDOWN_GRACE,
};
pub use store::{OutboxClaim, OutboxStore, PgOutboxClaim, PgOutboxStore};
pub use writer::{OutboxWrite, OutboxWriter, WritePhase};
