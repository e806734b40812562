use std::fmt;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::IdError;
use crate::worker::WorkerId;

/// Generator epoch: 2024-01-01T00:00:00Z in Unix milliseconds.
pub const CUSTOM_EPOCH_MS: i64 = 1_704_067_200_000;

const WORKER_SHIFT: u32 = 12;
const TIMESTAMP_SHIFT: u32 = 22;
const SEQUENCE_MASK: u64 = 0xFFF;
const MAX_REGRESSION_MS: i64 = 100;

/// Opaque, non-blank event identifier.
///
/// Produced by [`EventIdGenerator`] as the decimal rendering of the 64-bit
/// composite, but accepted from storage as any non-blank string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::BlankId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<u64> for EventId {
    fn from(raw: u64) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct GeneratorState {
    last_timestamp: i64,
    sequence: u64,
}

/// Thread-safe monotonic id generator.
///
/// State (`last_timestamp`, `sequence`) is guarded by a single mutex per
/// instance. The only blocking paths are bounded spin-waits: sequence
/// exhaustion within one millisecond, and clock regressions of at most
/// 100 ms. Larger regressions fail with [`IdError::ClockMovedBackwards`].
pub struct EventIdGenerator {
    worker_id: WorkerId,
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl EventIdGenerator {
    pub fn new(worker_id: WorkerId, clock: Arc<dyn Clock>) -> Self {
        Self {
            worker_id,
            clock,
            state: Mutex::new(GeneratorState {
                last_timestamp: -1,
                sequence: 0,
            }),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Mint the next id. Strictly greater than every id this instance has
    /// returned before.
    pub fn generate(&self) -> Result<EventId, IdError> {
        let mut state = self.state.lock();
        let mut now = self.clock.millis();

        if now < state.last_timestamp {
            let diff = state.last_timestamp - now;
            if diff > MAX_REGRESSION_MS {
                return Err(IdError::ClockMovedBackwards {
                    last_ms: state.last_timestamp,
                    current_ms: now,
                    diff_ms: diff,
                });
            }
            tracing::warn!(
                diff_ms = diff,
                "clock regression within budget, waiting it out"
            );
            now = self.wait_past(state.last_timestamp);
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // 4096 ids in one millisecond; wait for the next one.
                now = self.wait_past(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = now;

        if now < CUSTOM_EPOCH_MS {
            return Err(IdError::BeforeEpoch(now));
        }

        let raw = ((now - CUSTOM_EPOCH_MS) as u64) << TIMESTAMP_SHIFT
            | u64::from(self.worker_id.get()) << WORKER_SHIFT
            | state.sequence;
        Ok(EventId::from(raw))
    }

    fn wait_past(&self, last: i64) -> i64 {
        loop {
            let now = self.clock.millis();
            if now > last {
                return now;
            }
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    fn decimal(id: &EventId) -> u64 {
        id.as_str().parse().unwrap()
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = EventIdGenerator::new(WorkerId::new(1).unwrap(), Arc::new(SystemClock));
        let mut prev = decimal(&gen.generate().unwrap());
        for _ in 0..10_000 {
            let next = decimal(&gen.generate().unwrap());
            assert!(next > prev, "{next} must exceed {prev}");
            prev = next;
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let gen = Arc::new(EventIdGenerator::new(
            WorkerId::new(2).unwrap(),
            Arc::new(SystemClock),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = gen.clone();
                thread::spawn(move || {
                    (0..2_000)
                        .map(|_| decimal(&gen.generate().unwrap()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    #[test]
    fn id_layout_carries_worker_and_sequence() {
        let clock = ManualClock::at_millis(CUSTOM_EPOCH_MS + 5_000);
        let gen = EventIdGenerator::new(WorkerId::new(777).unwrap(), Arc::new(clock));

        let first = decimal(&gen.generate().unwrap());
        let second = decimal(&gen.generate().unwrap());

        assert_eq!((first >> 12) & 0x3FF, 777);
        assert_eq!(first >> 22, 5_000);
        assert_eq!(first & 0xFFF, 0);
        // Frozen clock: the second id lands in the same millisecond.
        assert_eq!(second, first + 1);
    }

    #[test]
    fn sequence_exhaustion_waits_for_next_millisecond() {
        let clock = ManualClock::at_millis(CUSTOM_EPOCH_MS + 1_000);
        let gen = Arc::new(EventIdGenerator::new(
            WorkerId::new(3).unwrap(),
            Arc::new(clock.clone()),
        ));

        for _ in 0..4_096 {
            gen.generate().unwrap();
        }

        let ticker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            clock.advance_millis(1);
        });

        let id = decimal(&gen.generate().unwrap());
        ticker.join().unwrap();
        assert_eq!(id >> 22, 1_001);
        assert_eq!(id & 0xFFF, 0);
    }

    #[test]
    fn small_regression_is_absorbed() {
        let clock = ManualClock::at_millis(CUSTOM_EPOCH_MS + 2_000);
        let gen = EventIdGenerator::new(WorkerId::new(4).unwrap(), Arc::new(clock.clone()));

        let before = decimal(&gen.generate().unwrap());

        clock.rewind_millis(50);
        let ticker = {
            let clock = clock.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                clock.advance_millis(60);
            })
        };

        let after = decimal(&gen.generate().unwrap());
        ticker.join().unwrap();
        assert!(after > before);
    }

    #[test]
    fn large_regression_is_rejected() {
        let clock = ManualClock::at_millis(CUSTOM_EPOCH_MS + 10_000);
        let gen = EventIdGenerator::new(WorkerId::new(5).unwrap(), Arc::new(clock.clone()));

        gen.generate().unwrap();
        clock.rewind_millis(5_000);

        match gen.generate() {
            Err(IdError::ClockMovedBackwards { diff_ms, .. }) => assert_eq!(diff_ms, 5_000),
            other => panic!("expected ClockMovedBackwards, got {other:?}"),
        }
    }

    #[test]
    fn blank_event_ids_are_rejected() {
        assert!(matches!(EventId::new("  "), Err(IdError::BlankId)));
        assert!(EventId::new("42").is_ok());
    }

    #[test]
    fn event_id_serde_is_transparent() {
        let id = EventId::new("123456").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"123456\"");
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
