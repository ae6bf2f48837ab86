//! Query execution subsystem.
//!
//! # Data Flow
//! ```text
//! Router::query(sql, params, options)
//!     → executor.rs (classify → select → breaker gate → pool → breaker/metrics)
//!
//! Router::transaction(f)
//!     → transaction.rs (primary connection → BEGIN → f → COMMIT | ROLLBACK)
//! ```
//!
//! # Design Decisions
//! - Errors from the database reach the caller unchanged
//! - Writes are never retried; a read is retried at most once, on one
//!   alternate replica, and only when its node's circuit is open
//! - Transactions always run on the primary

pub mod executor;
pub mod transaction;

use std::time::Duration;

pub use executor::QueryExecutor;
pub use transaction::{TransactionCoordinator, TxConnection};

/// Per-call routing options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Route to the primary even if the statement is a read.
    pub force_writable: bool,
    /// Ignore the replication lag bound for this read.
    pub allow_stale: bool,
    /// Deadline for the statement round-trip.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn force_writable(mut self) -> Self {
        self.force_writable = true;
        self
    }

    pub fn allow_stale(mut self) -> Self {
        self.allow_stale = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
