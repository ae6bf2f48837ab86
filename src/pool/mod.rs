//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! NodeConfig
//!     → PoolFactory::create (postgres.rs, memory.rs)
//!     → NodePool (deadlines around acquire/execute)
//!     → PooledConnection (returned to its pool on drop)
//! ```
//!
//! # Design Decisions
//! - The router never locks around the pool; pools are internally thread-safe
//! - Release is RAII: dropping a connection hands it back
//! - A connection left in an unknown state is discarded, not returned

pub mod memory;
pub mod postgres;
pub mod value;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NodeConfig;
use crate::error::DbError;
use crate::resilience::timeouts;

pub use value::{QueryResult, Row, SqlValue};

/// A borrowed connection. Dropping it releases it back to its pool.
pub type PooledConnection = Box<dyn Connection>;

/// Occupancy of a node's pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections, idle or borrowed.
    pub size: u32,
    pub idle: u32,
    pub borrowed: u32,
}

/// A live connection to one node.
#[async_trait]
pub trait Connection: Send {
    /// Execute a parameterized statement.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DbError>;

    /// Close the connection instead of returning it to the idle set on drop.
    fn discard(&mut self);
}

/// The pooling primitive for one node.
#[async_trait]
pub trait ConnectionPool: Send + Sync + fmt::Debug {
    /// Borrow a connection, waiting for capacity if the pool is full.
    async fn acquire(&self) -> Result<PooledConnection, DbError>;

    fn stats(&self) -> PoolStats;

    /// Close the pool, waiting for borrowed connections to come back.
    async fn close(&self);
}

/// Builds a pool from a node's connection parameters.
pub trait PoolFactory: Send + Sync {
    fn create(&self, config: &NodeConfig) -> Result<Arc<dyn ConnectionPool>, DbError>;
}

/// Per-node pool adapter that applies the node's deadlines.
#[derive(Debug, Clone)]
pub struct NodePool {
    inner: Arc<dyn ConnectionPool>,
    connect_timeout: Duration,
}

impl NodePool {
    pub fn new(inner: Arc<dyn ConnectionPool>, connect_timeout: Duration) -> Self {
        Self {
            inner,
            connect_timeout,
        }
    }

    /// Borrow a connection within the node's connect timeout.
    pub async fn acquire(&self) -> Result<PooledConnection, DbError> {
        timeouts::bounded(self.connect_timeout, self.inner.acquire()).await
    }

    /// Run one statement on a freshly borrowed connection.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<QueryResult, DbError> {
        let mut conn = self.acquire().await?;
        let result = timeouts::with_deadline(timeout, conn.execute(sql, params)).await;
        if matches!(result, Err(DbError::Timeout(_))) {
            conn.discard();
        }
        result
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory::MemoryPool;

    #[tokio::test]
    async fn test_connection_returns_to_pool_on_drop() {
        let memory = MemoryPool::new("db:5432", 2);
        let pool = NodePool::new(Arc::new(memory.clone()), Duration::from_secs(1));

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().borrowed, 1);
        drop(conn);

        let stats = pool.stats();
        assert_eq!(stats.borrowed, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_is_bounded_by_connect_timeout() {
        let memory = MemoryPool::new("db:5432", 1);
        let pool = NodePool::new(Arc::new(memory.clone()), Duration::from_millis(100));

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert!(err.is_timeout());
        assert_eq!(pool.stats().borrowed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_statement_discards_connection() {
        let memory = MemoryPool::new("db:5432", 1);
        memory.set_query_delay(Duration::from_secs(5));
        let pool = NodePool::new(Arc::new(memory.clone()), Duration::from_secs(1));

        let err = pool
            .execute("SELECT * FROM users", &[], Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pool.stats(), PoolStats { size: 0, idle: 0, borrowed: 0 });
    }
}
