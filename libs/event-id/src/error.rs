//! Error types for id generation.

use thiserror::Error;

/// Errors surfaced while minting or validating event ids.
#[derive(Debug, Error)]
pub enum IdError {
    /// The wall clock jumped backwards by more than the absorbable budget.
    ///
    /// Small regressions (at most 100 ms) are waited out; anything larger
    /// means the generator refuses to mint ids rather than risk duplicates.
    #[error("clock moved backwards: last={last_ms}ms current={current_ms}ms diff={diff_ms}ms")]
    ClockMovedBackwards {
        last_ms: i64,
        current_ms: i64,
        diff_ms: i64,
    },

    /// The clock reads an instant before the generator epoch (2024-01-01).
    #[error("clock reads {0}ms, before the generator epoch")]
    BeforeEpoch(i64),

    /// Worker ids carry 10 bits.
    #[error("worker id {0} out of range 0..=1023")]
    WorkerIdOutOfRange(u16),

    /// Event ids are opaque but never blank.
    #[error("event id must not be blank")]
    BlankId,

    /// MAC-derived worker ids need at least one interface with a hardware address.
    #[error("no network interface with a MAC address available")]
    MacUnavailable,
}
