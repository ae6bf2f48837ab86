//! Error types surfaced by the router.

use std::time::Duration;
use thiserror::Error;

use crate::config::loader::join_errors;
use crate::config::validation::ValidationError;

/// Boxed error returned by caller code inside a transaction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a node's pool or connection.
///
/// Deadline expiry is kept apart from driver failures so callers and the
/// circuit breaker can tell them apart.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

impl DbError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DbError::Timeout(_))
    }
}

/// Errors returned from [`Router`](crate::Router) operations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The read's node refuses traffic and no alternate replica is available.
    #[error("circuit open for node {node}")]
    CircuitOpen { node: String },

    /// The router was stopped; no node accepts queries.
    #[error("no eligible node: router is stopped")]
    NoEligibleNode,

    #[error("invalid router configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    /// Driver or pool error, passed through unchanged.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Error raised by caller code inside a transaction.
    #[error(transparent)]
    Callback(BoxError),

    /// The transaction failed and the ROLLBACK issued for it failed too.
    #[error("{error}; rollback also failed: {rollback}")]
    RollbackFailed {
        #[source]
        error: Box<RouterError>,
        rollback: DbError,
    },
}

impl RouterError {
    /// Wrap an arbitrary caller error.
    pub fn callback(error: impl Into<BoxError>) -> Self {
        RouterError::Callback(error.into())
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RouterError::CircuitOpen { .. })
    }
}
