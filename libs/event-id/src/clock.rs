use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

/// Injectable wall-clock source.
///
/// Production code uses [`SystemClock`]; tests inject [`ManualClock`] to make
/// time-dependent behavior (sequence rollover, clock regression) deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as milliseconds since the Unix epoch.
    fn millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// UTC system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock whose reading is set and advanced explicitly.
///
/// Cloned handles share the same underlying instant, so a test can hand one
/// clone to a generator and keep another to move time forward from a helper
/// thread while the generator spin-waits.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::at_millis(start.timestamp_millis())
    }

    pub fn at_millis(millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn rewind_millis(&self, delta: i64) {
        self.millis.fetch_sub(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .single()
            .expect("manual clock holds a representable instant")
    }

    fn millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.millis();
        let b = clock.millis();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_shares_state_across_clones() {
        let clock = ManualClock::at_millis(1_000);
        let handle = clock.clone();

        handle.advance_millis(500);
        assert_eq!(clock.millis(), 1_500);

        handle.rewind_millis(200);
        assert_eq!(clock.millis(), 1_300);
    }
}
