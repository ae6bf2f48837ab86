//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Query to node:
//!     → circuit_breaker.rs (refuse reads to an open node, close lazily)
//!     → timeouts.rs (enforce acquire/statement deadlines)
//!     → On failure: circuit_breaker.rs (count, open at threshold)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable for acquisition; statements take the
//!   caller's optional deadline
//! - Writes are never retried; reads get at most one alternate node
//! - Circuit breaker prevents hammering a failing replica

pub mod circuit_breaker;
pub mod timeouts;
