//! Circuit breaker for node protection.
//!
//! # States
//! - Closed: normal operation, reads may be routed to the node
//! - Open: node assumed down, reads are refused before touching the pool
//!
//! # State Transitions
//! ```text
//! Closed → Open:   consecutive_failures >= threshold
//! Open → Closed:   checked lazily when the node is about to be selected,
//!                  once more than `reset_after` has passed since it opened
//! ```
//!
//! # Design Decisions
//! - Per-node circuit breaker (not global), guarded by its own mutex
//! - No half-open probe: the first request after the cool-down is sent at
//!   full trust
//! - A success resets the failure count but never closes an open circuit
//!   before the cool-down elapses
//! - Uses `tokio::time::Instant` so tests can drive the clock

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub consecutive_failures: u32,
    pub open: bool,
    pub opened_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-node failure counter with a timed open/closed gate.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_after: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            reset_after,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the node may take a request right now.
    ///
    /// Closes an open circuit whose cool-down has elapsed, resetting the
    /// failure count.
    pub fn allow_request(&self) -> bool {
        let mut state = self.lock();
        match state.opened_at {
            None => true,
            Some(opened_at) if opened_at.elapsed() > self.reset_after => {
                state.opened_at = None;
                state.consecutive_failures = 0;
                tracing::info!(
                    open_for_ms = opened_at.elapsed().as_millis() as u64,
                    "Circuit cool-down elapsed, closing"
                );
                true
            }
            Some(_) => false,
        }
    }

    /// Whether the circuit is open, without attempting the lazy close.
    pub fn is_open(&self) -> bool {
        self.lock().opened_at.is_some()
    }

    /// Report a successful request.
    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    /// Report a failed request. Returns true if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.opened_at.is_none() && state.consecutive_failures >= self.threshold {
            state.opened_at = Some(Instant::now());
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            consecutive_failures: state.consecutive_failures,
            open: state.opened_at.is_some(),
            opened_at: state.opened_at,
        }
    }
}
