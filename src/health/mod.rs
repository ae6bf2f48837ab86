//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every node concurrently (SELECT 1, replication lag on replicas)
//!     → Update state.rs and the breaker on each NodeState
//!
//! State (state.rs):
//!     Healthy ←→ Unhealthy, plus latency, lag and last check time
//! ```
//!
//! # Design Decisions
//! - Health state is per-node and written only by the monitor
//! - Probe failures never reach callers; they are logged and recorded
//! - Probe outcomes feed the circuit breaker like query outcomes do; a
//!   successful probe resets the failure count but never closes an open
//!   circuit
//! - A tick waits for every probe (each bounded by the probe timeout)
//!   before the next tick is scheduled

pub mod active;
pub mod state;
