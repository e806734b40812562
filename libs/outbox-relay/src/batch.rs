//! Adaptive batch sizing for the relay.
//!
//! Throughput auto-tunes up in calm weather and collapses quickly under
//! failures: fully successful batches grow the next claim, any failure
//! halves it, and a quiet outbox gently re-widens after three consecutive
//! idle ticks so a burst after a lull is not drained ten rows at a time.

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub min: i64,
    pub max: i64,
    pub initial: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min: 10,
            max: 500,
            initial: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSnapshot {
    pub current: i64,
    pub idle_streak: u32,
}

struct BatchState {
    current: i64,
    idle_streak: u32,
}

/// Adaptive batch size in `[min, max]`.
pub struct BatchController {
    config: BatchConfig,
    state: Mutex<BatchState>,
}

impl BatchController {
    const IDLE_TICKS_BEFORE_WIDEN: u32 = 3;

    pub fn new(config: BatchConfig) -> Self {
        let initial = config.initial.clamp(config.min, config.max);
        Self {
            state: Mutex::new(BatchState {
                current: initial,
                idle_streak: 0,
            }),
            config,
        }
    }

    pub fn current(&self) -> i64 {
        self.state.lock().current
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        let state = self.state.lock();
        BatchSnapshot {
            current: state.current,
            idle_streak: state.idle_streak,
        }
    }

    /// A batch completed with every record delivered.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.idle_streak = 0;
        state.current = self.widened(state.current);
    }

    /// At least one record in the batch failed.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.idle_streak = 0;
        state.current = (state.current / 2).max(self.config.min);
    }

    /// The claim came back empty.
    pub fn record_idle(&self) {
        let mut state = self.state.lock();
        state.idle_streak += 1;
        if state.idle_streak >= Self::IDLE_TICKS_BEFORE_WIDEN {
            state.idle_streak = 0;
            state.current = self.widened(state.current);
        }
    }

    fn widened(&self, current: i64) -> i64 {
        // Step up by 25% or 10 rows, whichever is larger.
        let step = (current / 4).max(10);
        (current + step).min(self.config.max)
    }
}
