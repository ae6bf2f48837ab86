//! Single-statement execution.
//!
//! # Responsibilities
//! - Classify and route a statement
//! - Gate it on the chosen node's circuit breaker
//! - Run it on the node's pool within the caller's deadline
//! - Feed the outcome to the breaker and the metrics recorder
//!
//! # Design Decisions
//! - A write whose primary has an open circuit is still sent; there is
//!   nowhere else for it to go
//! - Timeouts count as failures, like any other database error

use std::sync::Arc;
use tokio::time::Instant;

use crate::error::RouterError;
use crate::load_balancer::node::NodeState;
use crate::observability::metrics::RouterMetrics;
use crate::pool::{QueryResult, SqlValue};
use crate::query::QueryOptions;
use crate::routing::classifier::{classify, QueryKind};
use crate::routing::selector::NodeSelector;

/// Routes and runs individual statements.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    selector: Arc<NodeSelector>,
    metrics: Arc<RouterMetrics>,
}

impl QueryExecutor {
    pub fn new(selector: Arc<NodeSelector>, metrics: Arc<RouterMetrics>) -> Self {
        Self { selector, metrics }
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        options: &QueryOptions,
    ) -> Result<QueryResult, RouterError> {
        let kind = classify(sql);
        let mut node = self.selector.select(kind, options);

        if !node.breaker().allow_request() {
            if kind.is_write() || options.force_writable {
                tracing::warn!(node = %node.name(), kind = kind.as_str(), "Circuit open, sending to primary anyway");
            } else {
                match self.selector.alternate(&node, options) {
                    Some(alternate) => {
                        tracing::warn!(
                            node = %node.name(),
                            alternate = %alternate.name(),
                            "Circuit open, retrying read on alternate replica"
                        );
                        node = alternate;
                    }
                    None => {
                        return Err(RouterError::CircuitOpen {
                            node: node.name().to_string(),
                        })
                    }
                }
            }
        }

        self.run_on(&node, kind, sql, params, options).await
    }

    async fn run_on(
        &self,
        node: &NodeState,
        kind: QueryKind,
        sql: &str,
        params: &[SqlValue],
        options: &QueryOptions,
    ) -> Result<QueryResult, RouterError> {
        tracing::debug!(node = %node.name(), kind = kind.as_str(), "Routing query");

        let started = Instant::now();
        let result = node.pool().execute(sql, params, options.timeout).await;
        let elapsed = started.elapsed();

        self.metrics.record_query(node.name(), kind, result.is_ok(), elapsed);
        match &result {
            Ok(_) => node.breaker().record_success(),
            Err(e) => {
                if node.breaker().record_failure() {
                    tracing::warn!(
                        node = %node.name(),
                        error = %e,
                        consecutive_failures = node.breaker().snapshot().consecutive_failures,
                        "Circuit opened"
                    );
                } else {
                    tracing::debug!(node = %node.name(), error = %e, "Query failed");
                }
            }
        }
        self.metrics.record_circuit(node.name(), node.breaker().is_open());
        self.metrics.record_pool(node.name(), node.pool().stats());

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReadPreference, RouterConfig};
    use crate::error::DbError;
    use crate::load_balancer::node::{testing::memory_node, NodeRole};
    use crate::pool::memory::MemoryPool;
    use std::time::Duration;

    struct Fixture {
        executor: QueryExecutor,
        metrics: Arc<RouterMetrics>,
        primary: Arc<NodeState>,
        primary_pool: MemoryPool,
        replicas: Vec<(Arc<NodeState>, MemoryPool)>,
    }

    fn fixture(preference: ReadPreference, replica_count: usize, threshold: u32) -> Fixture {
        let (primary, primary_pool) = memory_node("primary", NodeRole::Primary, threshold);
        let replicas: Vec<_> = (1..=replica_count)
            .map(|i| memory_node(&format!("replica-{}", i), NodeRole::Replica, threshold))
            .collect();
        let config = RouterConfig {
            read_preference: preference,
            ..RouterConfig::default()
        };
        let metrics = Arc::new(RouterMetrics::new());
        let selector = NodeSelector::new(
            primary.clone(),
            replicas.iter().map(|(node, _)| node.clone()).collect(),
            &config,
            metrics.clone(),
        );
        Fixture {
            executor: QueryExecutor::new(Arc::new(selector), metrics.clone()),
            metrics,
            primary,
            primary_pool,
            replicas,
        }
    }

    fn served_by(result: &QueryResult) -> &str {
        result.scalar().and_then(SqlValue::as_str).unwrap()
    }

    #[tokio::test]
    async fn test_read_is_served_by_replica() {
        let f = fixture(ReadPreference::Replica, 1, 5);
        let result = f
            .executor
            .execute("SELECT * FROM users", &[], &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(served_by(&result), "replica-1:5432");

        let text = f.metrics.render();
        assert!(text.contains(r#"node="replica-1:5432""#));
        assert!(text.contains(r#"type="read""#));
        assert!(text.contains(r#"status="success""#));
    }

    #[tokio::test]
    async fn test_write_returning_targets_primary() {
        let f = fixture(ReadPreference::Replica, 2, 5);
        let result = f
            .executor
            .execute(
                "INSERT INTO users (name) VALUES ($1) RETURNING id",
                &[SqlValue::from("ada")],
                &QueryOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(f.primary_pool.committed_writes().len(), 1);
        for (_, pool) in &f.replicas {
            assert!(pool.executed().is_empty());
        }
    }

    #[tokio::test]
    async fn test_errors_pass_through_and_trip_breaker() {
        let f = fixture(ReadPreference::Replica, 2, 3);
        let (replica, pool) = &f.replicas[0];
        pool.set_fail_queries(true);
        // keep the other replica out of rotation so every read lands on the failing one
        f.replicas[1].0.mark_unhealthy();

        for _ in 0..3 {
            let err = f
                .executor
                .execute("SELECT 1 FROM orders", &[], &QueryOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, RouterError::Database(DbError::Query(_))), "{err}");
        }
        assert!(replica.breaker().is_open());
        assert!(f.metrics.render().contains(r#"status="error""#));

        // the open replica is skipped and the read falls back to the primary
        let result = f
            .executor
            .execute("SELECT 1 FROM orders", &[], &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(served_by(&result), f.primary.name());
        assert_eq!(pool.executed_count("SELECT 1 FROM orders"), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let f = fixture(ReadPreference::Primary, 0, 3);
        f.primary_pool.set_fail_queries(true);
        for _ in 0..2 {
            assert!(f.executor.execute("SELECT 1", &[], &QueryOptions::default()).await.is_err());
        }
        f.primary_pool.set_fail_queries(false);
        f.executor.execute("SELECT 1", &[], &QueryOptions::default()).await.unwrap();
        assert_eq!(f.primary.breaker().snapshot().consecutive_failures, 0);
        assert!(!f.primary.breaker().is_open());
    }

    #[tokio::test]
    async fn test_open_primary_refuses_reads_but_accepts_writes() {
        let f = fixture(ReadPreference::Replica, 0, 1);
        f.primary.breaker().record_failure();

        let err = f
            .executor
            .execute("SELECT * FROM users", &[], &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert!(f.primary_pool.executed().is_empty());

        f.executor
            .execute("UPDATE users SET name = 'x'", &[], &QueryOptions::default())
            .await
            .unwrap();
        f.executor
            .execute("SELECT * FROM users", &[], &QueryOptions::default().force_writable())
            .await
            .unwrap();
        assert_eq!(f.primary_pool.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_open_circuit_read_moves_to_alternate_replica() {
        let f = fixture(ReadPreference::Primary, 1, 1);
        f.primary.breaker().record_failure();

        let result = f
            .executor
            .execute("SELECT * FROM users", &[], &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(served_by(&result), "replica-1:5432");
        assert!(f.primary_pool.executed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let f = fixture(ReadPreference::Primary, 0, 1);
        f.primary_pool.set_query_delay(Duration::from_secs(5));

        let err = f
            .executor
            .execute(
                "SELECT pg_sleep(5)",
                &[],
                &QueryOptions::default().timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Database(ref e) if e.is_timeout()));
        assert!(f.primary.breaker().is_open());
        assert_eq!(f.primary.pool().stats().borrowed, 0);
    }
}
