//! Transactions on the primary.
//!
//! # Responsibilities
//! - Borrow one primary connection for the whole transaction
//! - BEGIN, run the caller's closure, then COMMIT or ROLLBACK
//! - Return the connection on every exit path
//!
//! # Design Decisions
//! - The connection is owned by a guard; if it is dropped while the
//!   transaction is still open (cancelled future, failed ROLLBACK) it is
//!   discarded instead of going back to the idle set
//! - Errors raised by the closure are the caller's and do not count
//!   against the primary's circuit breaker; BEGIN/COMMIT failures do
//! - No reentrancy guard: nesting is the caller's responsibility

use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{DbError, RouterError};
use crate::load_balancer::node::NodeState;
use crate::observability::metrics::RouterMetrics;
use crate::pool::{PooledConnection, QueryResult, SqlValue};
use crate::routing::classifier::QueryKind;

/// A primary connection inside an open transaction.
pub struct TxConnection {
    conn: PooledConnection,
    node: String,
    open: bool,
}

impl TxConnection {
    /// Execute a statement inside the transaction.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, RouterError> {
        Ok(self.conn.execute(sql, params).await?)
    }

    /// Address of the node the transaction runs on.
    pub fn node(&self) -> &str {
        &self.node
    }
}

impl Drop for TxConnection {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!(node = %self.node, "Transaction connection dropped while open, discarding");
            self.conn.discard();
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    primary: Arc<NodeState>,
    metrics: Arc<RouterMetrics>,
}

impl TransactionCoordinator {
    pub fn new(primary: Arc<NodeState>, metrics: Arc<RouterMetrics>) -> Self {
        Self { primary, metrics }
    }

    /// Run `f` inside a transaction on the primary.
    ///
    /// The closure's error (or the COMMIT error) is returned as is after a
    /// successful ROLLBACK. If ROLLBACK fails too, both are returned in
    /// [`RouterError::RollbackFailed`].
    pub async fn run<T, F>(&self, f: F) -> Result<T, RouterError>
    where
        F: for<'c> FnOnce(&'c mut TxConnection) -> BoxFuture<'c, Result<T, RouterError>>,
    {
        let transaction_id = Uuid::new_v4();
        let span = tracing::info_span!("transaction", %transaction_id, node = %self.primary.name());

        async move {
            let started = Instant::now();
            let result = self.run_inner(f).await;
            self.metrics
                .record_query(self.primary.name(), QueryKind::Write, result.is_ok(), started.elapsed());
            self.metrics.record_circuit(self.primary.name(), self.primary.breaker().is_open());
            self.metrics.record_pool(self.primary.name(), self.primary.pool().stats());
            result
        }
        .instrument(span)
        .await
    }

    async fn run_inner<T, F>(&self, f: F) -> Result<T, RouterError>
    where
        F: for<'c> FnOnce(&'c mut TxConnection) -> BoxFuture<'c, Result<T, RouterError>>,
    {
        let conn = self
            .primary
            .pool()
            .acquire()
            .await
            .map_err(|e| self.primary_failed(e))?;

        let mut tx = TxConnection {
            conn,
            node: self.primary.name().to_string(),
            open: true,
        };
        tx.conn
            .execute("BEGIN", &[])
            .await
            .map_err(|e| self.primary_failed(e))?;
        tracing::debug!("Transaction started");

        let error = match f(&mut tx).await {
            Ok(value) => match tx.conn.execute("COMMIT", &[]).await {
                Ok(_) => {
                    tx.open = false;
                    self.primary.breaker().record_success();
                    tracing::debug!("Transaction committed");
                    return Ok(value);
                }
                Err(e) => self.primary_failed(e),
            },
            Err(e) => e,
        };

        match tx.conn.execute("ROLLBACK", &[]).await {
            Ok(_) => {
                tx.open = false;
                tracing::debug!(error = %error, "Transaction rolled back");
                Err(error)
            }
            Err(rollback) => {
                tracing::error!(error = %error, rollback_error = %rollback, "Rollback failed");
                Err(RouterError::RollbackFailed {
                    error: Box::new(error),
                    rollback,
                })
            }
        }
    }

    fn primary_failed(&self, error: DbError) -> RouterError {
        if self.primary.breaker().record_failure() {
            tracing::warn!(node = %self.primary.name(), error = %error, "Circuit opened");
        }
        error.into()
    }
}
