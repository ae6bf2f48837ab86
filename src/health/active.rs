//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every node, concurrently
//! - Measure probe latency and, on replicas, replication lag
//! - Update node health state and the circuit breaker based on results

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::error::DbError;
use crate::load_balancer::node::NodeState;
use crate::observability::metrics::RouterMetrics;
use crate::pool::{PooledConnection, QueryResult, SqlValue};
use crate::resilience::timeouts;

/// Liveness probe sent to every node.
pub const LIVENESS_QUERY: &str = "SELECT 1";

/// Replication delay of a streaming replica, in milliseconds. NULL until the
/// replica has replayed its first transaction.
pub const REPLICATION_LAG_QUERY: &str =
    "SELECT (EXTRACT(EPOCH FROM (now() - pg_last_xact_replay_timestamp())) * 1000)::float8 AS lag_ms";

/// Outcome of a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProbeReport {
    latency_ms: u64,
    lag_ms: Option<u64>,
}

/// Convert the lag probe's answer to whole non-negative milliseconds.
pub fn lag_millis(value: Option<&SqlValue>) -> u64 {
    let millis = match value {
        Some(SqlValue::Float(v)) => *v,
        Some(SqlValue::Int(v)) => *v as f64,
        Some(SqlValue::Text(v)) => v.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if millis.is_finite() && millis > 0.0 {
        millis.round() as u64
    } else {
        0
    }
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    nodes: Vec<Arc<NodeState>>,
    interval: Duration,
    probe_timeout: Duration,
    metrics: Arc<RouterMetrics>,
}

impl HealthMonitor {
    pub fn new(
        nodes: Vec<Arc<NodeState>>,
        interval: Duration,
        probe_timeout: Duration,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            nodes,
            interval,
            probe_timeout,
            metrics,
        }
    }

    /// Probe on every interval until shutdown. The first tick fires one
    /// interval from now; the caller runs the initial check itself.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            nodes = self.nodes.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        // A slow tick pushes the next one back instead of bunching probes.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every node concurrently and wait for all of them.
    pub async fn check_all(&self) {
        join_all(self.nodes.iter().map(|node| self.check_node(node))).await;
    }

    async fn check_node(&self, node: &Arc<NodeState>) {
        match self.probe(node).await {
            Ok(report) => {
                node.mark_healthy(report.latency_ms, report.lag_ms);
                node.breaker().record_success();
                tracing::debug!(
                    node = %node.name(),
                    latency_ms = report.latency_ms,
                    lag_ms = ?report.lag_ms,
                    "Health check passed"
                );
                self.metrics.record_health_check(node.name(), true, report.lag_ms);
            }
            Err(e) => {
                node.mark_unhealthy();
                if node.breaker().record_failure() {
                    tracing::warn!(node = %node.name(), error = %e, "Health check failed, circuit opened");
                } else {
                    tracing::warn!(node = %node.name(), error = %e, "Health check failed");
                }
                self.metrics.record_health_check(node.name(), false, None);
            }
        }
        self.metrics.record_circuit(node.name(), node.breaker().is_open());
        self.metrics.record_pool(node.name(), node.pool().stats());
    }

    /// One probe, bounded as a whole by the probe timeout. A statement cut
    /// off by the deadline discards its connection.
    async fn probe(&self, node: &NodeState) -> Result<ProbeReport, DbError> {
        let deadline = time::Instant::now() + self.probe_timeout;
        let mut conn = timeouts::bounded(self.probe_timeout, node.pool().acquire()).await?;

        let started = Instant::now();
        Self::probe_statement(&mut conn, LIVENESS_QUERY, deadline).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let lag_ms = if node.is_primary() {
            None
        } else {
            let result = Self::probe_statement(&mut conn, REPLICATION_LAG_QUERY, deadline).await?;
            Some(lag_millis(result.scalar()))
        };

        Ok(ProbeReport { latency_ms, lag_ms })
    }

    async fn probe_statement(
        conn: &mut PooledConnection,
        sql: &str,
        deadline: time::Instant,
    ) -> Result<QueryResult, DbError> {
        let remaining = deadline.saturating_duration_since(time::Instant::now());
        let result = timeouts::bounded(remaining, conn.execute(sql, &[])).await;
        if matches!(result, Err(DbError::Timeout(_))) {
            conn.discard();
        }
        result
    }
}
