/// Circuit Breaker keyed on broker health.
///
/// Tracks the trailing window of send outcomes and computes the failure
/// ratio over it. State transitions:
/// - Closed → Open: failure ratio over the window exceeds the threshold,
///   once a minimum number of samples has accumulated
/// - Open → HalfOpen: after the cooldown elapses, on the next `acquire`
/// - HalfOpen → Closed: the single admitted probe succeeds
/// - HalfOpen → Open: the probe fails (cooldown restarts)
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Testing if the broker recovered; one probe at a time
    HalfOpen,
}

/// What the caller is allowed to do this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Closed circuit: process the full batch.
    Full,
    /// Half-open circuit: send exactly one probe record.
    Probe,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Sliding window size (number of trailing attempts considered)
    pub window_size: usize,
    /// Failure ratio over the window that opens the circuit (0.0 - 1.0)
    pub failure_rate_threshold: f64,
    /// Minimum attempts in the window before the ratio is trusted
    pub min_samples: usize,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_rate_threshold: 0.5,
            min_samples: 10,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<BreakerState>>,
}

struct BreakerState {
    current: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Sliding window: true = success, false = failure
    window: VecDeque<bool>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(BreakerState {
                current: CircuitState::Closed,
                opened_at: None,
                probe_in_flight: false,
                window: VecDeque::with_capacity(config.window_size),
            })),
            config,
        }
    }

    /// Ask for permission to talk to the broker.
    ///
    /// Returns `None` while the circuit is open; at most one
    /// [`Permit::Probe`] is outstanding in the half-open state.
    pub fn acquire(&self) -> Option<Permit> {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed => Some(Permit::Full),
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .is_some_and(|opened_at| opened_at.elapsed() >= self.config.cooldown);
                if !cooled_down {
                    return None;
                }
                info!("circuit breaker: Open → HalfOpen");
                state.current = CircuitState::HalfOpen;
                state.probe_in_flight = true;
                Some(Permit::Probe)
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    return None;
                }
                state.probe_in_flight = true;
                Some(Permit::Probe)
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed => {
                self.push_outcome(&mut state, true);
            }
            CircuitState::HalfOpen => {
                info!("circuit breaker: HalfOpen → Closed (probe succeeded)");
                state.current = CircuitState::Closed;
                state.opened_at = None;
                state.probe_in_flight = false;
                state.window.clear();
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed => {
                self.push_outcome(&mut state, false);
                let rate = Self::rate(&state.window);
                if state.window.len() >= self.config.min_samples
                    && rate > self.config.failure_rate_threshold
                {
                    warn!(
                        failure_rate = format_args!("{:.0}%", rate * 100.0),
                        window = state.window.len(),
                        "circuit breaker: Closed → Open"
                    );
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker: HalfOpen → Open (probe failed)");
                state.current = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                state.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Hand back a probe permit that was never exercised (e.g. the caller
    /// found no work). Without this the half-open state would wait forever
    /// for an outcome that is not coming.
    pub fn release_probe(&self) {
        let mut state = self.state.write();
        if state.current == CircuitState::HalfOpen {
            state.probe_in_flight = false;
        }
    }

    fn push_outcome(&self, state: &mut BreakerState, success: bool) {
        if state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(success);
    }

    fn rate(window: &VecDeque<bool>) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let failures = window.iter().filter(|&&ok| !ok).count();
        failures as f64 / window.len() as f64
    }

    /// Current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    /// Current failure rate over the window (for monitoring)
    pub fn failure_rate(&self) -> f64 {
        Self::rate(&self.state.read().window)
    }

    pub fn window_len(&self) -> usize {
        self.state.read().window.len()
    }
}
