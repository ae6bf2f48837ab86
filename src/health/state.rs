//! Node health state.
//!
//! # States
//! - Healthy: node may receive reads (subject to lag and circuit)
//! - Unhealthy: node excluded from replica selection
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: one failed probe
//! Unhealthy → Healthy: one successful probe
//! ```
//!
//! # Design Decisions
//! - Written only by the health monitor, read by the selector and stats
//! - A failed probe leaves latency and lag untouched; they are inert while
//!   the node is unhealthy
//! - Nodes start healthy so traffic flows before the first probe completes

use chrono::{DateTime, Utc};

/// Last known health of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHealth {
    pub healthy: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    /// Round-trip of the last successful probe.
    pub latency_ms: u64,
    /// Replication delay. Always 0 on the primary.
    pub lag_ms: u64,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self {
            healthy: true,
            last_check_at: None,
            latency_ms: 0,
            lag_ms: 0,
        }
    }
}

impl NodeHealth {
    /// Apply a successful probe. `lag_ms` is `None` for the primary.
    pub fn record_success(&mut self, latency_ms: u64, lag_ms: Option<u64>, at: DateTime<Utc>) {
        self.healthy = true;
        self.latency_ms = latency_ms;
        if let Some(lag_ms) = lag_ms {
            self.lag_ms = lag_ms;
        }
        self.last_check_at = Some(at);
    }

    /// Apply a failed probe.
    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        self.healthy = false;
        self.last_check_at = Some(at);
    }
}
