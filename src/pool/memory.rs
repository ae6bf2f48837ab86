//! In-process pool for tests and local development.
//!
//! Statements are not parsed beyond what routing needs: writes are appended
//! to a log (committed immediately, or staged until COMMIT inside a
//! transaction), reads answer with a single `node` column naming the pool,
//! and the replication-lag probe answers with the configured lag.
//! Faults (refused connections, failing statements, failing commits, delays)
//! can be injected at any time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::config::NodeConfig;
use crate::error::DbError;
use crate::health::active::REPLICATION_LAG_QUERY;
use crate::pool::{Connection, ConnectionPool, PoolFactory, PoolStats, PooledConnection};
use crate::pool::value::{QueryResult, SqlValue};
use crate::routing::classifier::{classify, QueryKind};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    down: bool,
    fail_queries: bool,
    fail_commit: bool,
    acquire_delay: Duration,
    query_delay: Duration,
    replication_lag_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct Counters {
    opened: u32,
    borrowed: u32,
}

#[derive(Debug)]
struct Journal {
    executed: Vec<String>,
    committed: Vec<String>,
    next_id: i64,
}

#[derive(Debug)]
struct Inner {
    name: String,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    /// Signalled whenever the last borrowed connection comes back.
    drained: Notify,
    behavior: Mutex<Behavior>,
    counters: Mutex<Counters>,
    journal: Mutex<Journal>,
}

/// A pool whose "database" is an in-memory statement journal.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    inner: Arc<Inner>,
}

impl MemoryPool {
    pub fn new(name: impl Into<String>, max_connections: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                permits: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
                closed: AtomicBool::new(false),
                drained: Notify::new(),
                behavior: Mutex::new(Behavior::default()),
                counters: Mutex::new(Counters::default()),
                journal: Mutex::new(Journal {
                    executed: Vec::new(),
                    committed: Vec::new(),
                    next_id: 1,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Refuse every new connection.
    pub fn set_down(&self, down: bool) {
        lock(&self.inner.behavior).down = down;
    }

    /// Fail every statement, including health probes.
    pub fn set_fail_queries(&self, fail: bool) {
        lock(&self.inner.behavior).fail_queries = fail;
    }

    pub fn set_fail_commit(&self, fail: bool) {
        lock(&self.inner.behavior).fail_commit = fail;
    }

    pub fn set_acquire_delay(&self, delay: Duration) {
        lock(&self.inner.behavior).acquire_delay = delay;
    }

    pub fn set_query_delay(&self, delay: Duration) {
        lock(&self.inner.behavior).query_delay = delay;
    }

    /// Lag reported to the replication probe. `None` answers NULL.
    pub fn set_replication_lag_ms(&self, lag_ms: Option<f64>) {
        lock(&self.inner.behavior).replication_lag_ms = lag_ms;
    }

    /// Every statement received, in order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.inner.journal).executed.clone()
    }

    /// How many times exactly `sql` was received.
    pub fn executed_count(&self, sql: &str) -> usize {
        lock(&self.inner.journal)
            .executed
            .iter()
            .filter(|s| s.as_str() == sql)
            .count()
    }

    /// Write statements that are durably visible.
    pub fn committed_writes(&self) -> Vec<String> {
        lock(&self.inner.journal).committed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    async fn acquire(&self) -> Result<PooledConnection, DbError> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }

        let behavior = lock(&self.inner.behavior).clone();
        if !behavior.acquire_delay.is_zero() {
            tokio::time::sleep(behavior.acquire_delay).await;
        }
        if behavior.down {
            return Err(DbError::Connection(format!(
                "{}: connection refused",
                self.inner.name
            )));
        }

        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbError::PoolClosed)?;

        {
            let mut counters = lock(&self.inner.counters);
            counters.borrowed += 1;
            counters.opened = counters.opened.max(counters.borrowed);
        }

        Ok(Box::new(MemoryConnection {
            pool: self.inner.clone(),
            pending: None,
            discarded: false,
            _permit: permit,
        }))
    }

    fn stats(&self) -> PoolStats {
        let counters = lock(&self.inner.counters);
        PoolStats {
            size: counters.opened,
            idle: counters.opened - counters.borrowed,
            borrowed: counters.borrowed,
        }
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();

        loop {
            // Registered before the check so a release in between is not missed.
            let drained = self.inner.drained.notified();
            if lock(&self.inner.counters).borrowed == 0 {
                break;
            }
            drained.await;
        }
        lock(&self.inner.counters).opened = 0;
    }
}

struct MemoryConnection {
    pool: Arc<Inner>,
    /// Writes staged by an open transaction.
    pending: Option<Vec<String>>,
    discarded: bool,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    fn record_write(&mut self, statement: &str) -> i64 {
        let mut journal = lock(&self.pool.journal);
        let id = journal.next_id;
        journal.next_id += 1;
        match self.pending.as_mut() {
            Some(pending) => pending.push(statement.to_string()),
            None => journal.committed.push(statement.to_string()),
        }
        id
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<QueryResult, DbError> {
        let behavior = lock(&self.pool.behavior).clone();
        if !behavior.query_delay.is_zero() {
            tokio::time::sleep(behavior.query_delay).await;
        }

        lock(&self.pool.journal).executed.push(sql.to_string());

        if behavior.fail_queries {
            return Err(DbError::Query(format!("{}: injected failure", self.pool.name)));
        }

        let statement = sql.trim().trim_end_matches(';').trim_end();
        let upper = statement.to_ascii_uppercase();

        match upper.as_str() {
            "BEGIN" | "START TRANSACTION" => {
                self.pending = Some(Vec::new());
                return Ok(QueryResult::default());
            }
            "COMMIT" => {
                if behavior.fail_commit {
                    return Err(DbError::Query(format!(
                        "{}: could not serialize access",
                        self.pool.name
                    )));
                }
                if let Some(pending) = self.pending.take() {
                    lock(&self.pool.journal).committed.extend(pending);
                }
                return Ok(QueryResult::default());
            }
            "ROLLBACK" => {
                self.pending = None;
                return Ok(QueryResult::default());
            }
            s if s.starts_with("SAVEPOINT") || s.starts_with("RELEASE") => {
                return Ok(QueryResult::default());
            }
            _ => {}
        }

        if statement == REPLICATION_LAG_QUERY {
            let lag = behavior
                .replication_lag_ms
                .map(SqlValue::Float)
                .unwrap_or(SqlValue::Null);
            return Ok(QueryResult::from_rows(vec!["lag_ms".into()], vec![vec![lag]], 0));
        }

        match classify(statement) {
            QueryKind::Write => {
                let id = self.record_write(statement);
                if upper.contains("RETURNING") {
                    Ok(QueryResult::from_rows(
                        vec!["id".into()],
                        vec![vec![SqlValue::Int(id)]],
                        1,
                    ))
                } else {
                    Ok(QueryResult::affected(1))
                }
            }
            QueryKind::Read => Ok(QueryResult::from_rows(
                vec!["node".into()],
                vec![vec![SqlValue::Text(self.pool.name.clone())]],
                0,
            )),
        }
    }

    fn discard(&mut self) {
        self.discarded = true;
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        // Staged writes die with the connection.
        let drained = {
            let mut counters = lock(&self.pool.counters);
            counters.borrowed -= 1;
            if self.discarded {
                counters.opened -= 1;
            }
            counters.borrowed == 0
        };
        if drained {
            self.pool.drained.notify_waiters();
        }
    }
}

/// Hands out one [`MemoryPool`] per node address.
///
/// Pools are created on first use, so a test can grab a node's pool and
/// inject faults before or after the router is built.
#[derive(Debug, Default)]
pub struct MemoryPoolFactory {
    pools: Mutex<HashMap<String, MemoryPool>>,
}

impl MemoryPoolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool for `address` (`host:port`).
    pub fn pool(&self, address: &str) -> MemoryPool {
        self.pool_with_capacity(address, 10)
    }

    fn pool_with_capacity(&self, address: &str, max_connections: u32) -> MemoryPool {
        lock(&self.pools)
            .entry(address.to_string())
            .or_insert_with(|| MemoryPool::new(address, max_connections))
            .clone()
    }
}

impl PoolFactory for MemoryPoolFactory {
    fn create(&self, config: &NodeConfig) -> Result<Arc<dyn ConnectionPool>, DbError> {
        let pool = self.pool_with_capacity(&config.address(), config.max_connections);
        Ok(Arc::new(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transaction_staging() {
        let pool = MemoryPool::new("db:5432", 2);
        let mut conn = pool.acquire().await.unwrap();

        conn.execute("BEGIN", &[]).await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        assert!(pool.committed_writes().is_empty());
        conn.execute("COMMIT", &[]).await.unwrap();
        assert_eq!(pool.committed_writes(), vec!["INSERT INTO t VALUES (1)"]);

        conn.execute("BEGIN", &[]).await.unwrap();
        conn.execute("DELETE FROM t", &[]).await.unwrap();
        conn.execute("ROLLBACK", &[]).await.unwrap();
        assert_eq!(pool.committed_writes().len(), 1);
    }

    #[tokio::test]
    async fn test_reads_name_the_node_and_returning_yields_ids() {
        let pool = MemoryPool::new("replica-1:5432", 1);
        let mut conn = pool.acquire().await.unwrap();

        let read = conn.execute("SELECT * FROM users", &[]).await.unwrap();
        assert_eq!(read.scalar().and_then(SqlValue::as_str), Some("replica-1:5432"));

        let first = conn.execute("INSERT INTO users (name) VALUES ($1) RETURNING id", &[]).await.unwrap();
        let second = conn.execute("INSERT INTO users (name) VALUES ($1) RETURNING id", &[]).await.unwrap();
        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.scalar(), Some(&SqlValue::Int(1)));
        assert_eq!(second.scalar(), Some(&SqlValue::Int(2)));
    }

    #[tokio::test]
    async fn test_close_rejects_new_connections() {
        let pool = MemoryPool::new("db:5432", 1);
        pool.close().await;
        assert!(matches!(pool.acquire().await.err(), Some(DbError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_close_waits_for_borrowed_connections() {
        let pool = MemoryPool::new("db:5432", 2);
        let conn = pool.acquire().await.unwrap();

        let closing = tokio::spawn({
            let pool = pool.clone();
            async move { pool.close().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pool.is_closed());
        assert!(!closing.is_finished());

        drop(conn);
        closing.await.unwrap();
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[tokio::test]
    async fn test_factory_shares_pools_by_address() {
        let factory = MemoryPoolFactory::new();
        let handle = factory.pool("db:5432");
        handle.set_down(true);

        let created = factory.create(&NodeConfig::new("db", 5432)).unwrap();
        assert!(created.acquire().await.is_err());
    }
}
