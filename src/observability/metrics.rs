//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (queries, latency, connections, health, lag)
//! - Render them in the Prometheus text exposition format on demand
//! - Track per-node metrics
//!
//! # Metrics
//! - `db_router_queries_total` (counter): queries by node, type, status
//! - `db_router_query_duration_seconds` (histogram): latency by node, type
//! - `db_router_active_connections` (gauge): borrowed pool connections
//! - `db_router_idle_connections` (gauge): idle pool connections
//! - `db_router_node_health` (gauge): 1=healthy, 0=unhealthy
//! - `db_router_replica_lag_ms` (gauge): replication delay
//! - `db_router_health_checks_total` (counter): probes by node, status
//! - `db_router_circuit_open` (gauge): 1=open, 0=closed
//! - `db_router_replica_fallbacks_total` (counter): reads sent to the
//!   primary because no replica was eligible
//!
//! # Design Decisions
//! - Each router owns its recorder; no global recorder is installed
//! - Updates are fire-and-forget and safe from any thread
//! - Histogram buckets tuned for database round-trips

use metrics::{counter, gauge, histogram, with_local_recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::fmt;
use std::time::Duration;

use crate::pool::PoolStats;
use crate::routing::classifier::QueryKind;

pub const QUERIES_TOTAL: &str = "db_router_queries_total";
pub const QUERY_DURATION: &str = "db_router_query_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "db_router_active_connections";
pub const IDLE_CONNECTIONS: &str = "db_router_idle_connections";
pub const NODE_HEALTH: &str = "db_router_node_health";
pub const REPLICA_LAG: &str = "db_router_replica_lag_ms";
pub const HEALTH_CHECKS_TOTAL: &str = "db_router_health_checks_total";
pub const CIRCUIT_OPEN: &str = "db_router_circuit_open";
pub const REPLICA_FALLBACKS_TOTAL: &str = "db_router_replica_fallbacks_total";

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Router-owned metrics recorder.
pub struct RouterMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl fmt::Debug for RouterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterMetrics").finish_non_exhaustive()
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterMetrics {
    pub fn new() -> Self {
        let builder = match PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(QUERY_DURATION.to_string()), DURATION_BUCKETS)
        {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid histogram buckets, falling back to summaries");
                PrometheusBuilder::new()
            }
        };
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        let metrics = Self { recorder, handle };
        metrics.describe();
        metrics
    }

    fn describe(&self) {
        with_local_recorder(&self.recorder, || {
            metrics::describe_counter!(QUERIES_TOTAL, "Queries routed, by node, type and status");
            metrics::describe_histogram!(
                QUERY_DURATION,
                metrics::Unit::Seconds,
                "Query execution time, by node and type"
            );
            metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Borrowed pool connections per node");
            metrics::describe_gauge!(IDLE_CONNECTIONS, "Idle pool connections per node");
            metrics::describe_gauge!(NODE_HEALTH, "Node health from the last probe (1=healthy)");
            metrics::describe_gauge!(REPLICA_LAG, "Replication lag in milliseconds");
            metrics::describe_counter!(HEALTH_CHECKS_TOTAL, "Health probes, by node and status");
            metrics::describe_gauge!(CIRCUIT_OPEN, "Circuit breaker state (1=open)");
            metrics::describe_counter!(
                REPLICA_FALLBACKS_TOTAL,
                "Reads sent to the primary because no replica was eligible"
            );
        });
    }

    /// Record the outcome of one routed query.
    pub fn record_query(&self, node: &str, kind: QueryKind, success: bool, elapsed: Duration) {
        let status = if success { "success" } else { "error" };
        with_local_recorder(&self.recorder, || {
            counter!(
                QUERIES_TOTAL,
                "node" => node.to_string(),
                "type" => kind.as_str(),
                "status" => status
            )
            .increment(1);
            histogram!(QUERY_DURATION, "node" => node.to_string(), "type" => kind.as_str())
                .record(elapsed.as_secs_f64());
        });
    }

    /// Record a node's pool occupancy.
    pub fn record_pool(&self, node: &str, stats: PoolStats) {
        with_local_recorder(&self.recorder, || {
            gauge!(ACTIVE_CONNECTIONS, "node" => node.to_string()).set(f64::from(stats.borrowed));
            gauge!(IDLE_CONNECTIONS, "node" => node.to_string()).set(f64::from(stats.idle));
        });
    }

    /// Record the result of one health probe. `lag_ms` is `None` for the
    /// primary and for failed probes.
    pub fn record_health_check(&self, node: &str, healthy: bool, lag_ms: Option<u64>) {
        let status = if healthy { "success" } else { "error" };
        with_local_recorder(&self.recorder, || {
            counter!(HEALTH_CHECKS_TOTAL, "node" => node.to_string(), "status" => status).increment(1);
            gauge!(NODE_HEALTH, "node" => node.to_string()).set(if healthy { 1.0 } else { 0.0 });
            if let Some(lag_ms) = lag_ms {
                gauge!(REPLICA_LAG, "node" => node.to_string()).set(lag_ms as f64);
            }
        });
    }

    pub fn record_circuit(&self, node: &str, open: bool) {
        with_local_recorder(&self.recorder, || {
            gauge!(CIRCUIT_OPEN, "node" => node.to_string()).set(if open { 1.0 } else { 0.0 });
        });
    }

    pub fn record_replica_fallback(&self) {
        with_local_recorder(&self.recorder, || {
            counter!(REPLICA_FALLBACKS_TOTAL).increment(1);
        });
    }

    /// Current state in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_labelled_series() {
        let metrics = RouterMetrics::new();
        metrics.record_query("replica-1:5432", QueryKind::Read, true, Duration::from_millis(3));
        metrics.record_query("primary:5432", QueryKind::Write, false, Duration::from_millis(8));
        metrics.record_health_check("replica-1:5432", true, Some(120));
        metrics.record_pool("primary:5432", PoolStats { size: 3, idle: 1, borrowed: 2 });

        let text = metrics.render();
        assert!(text.contains(QUERIES_TOTAL));
        assert!(text.contains(r#"node="replica-1:5432""#));
        assert!(text.contains(r#"type="read""#));
        assert!(text.contains(r#"status="error""#));
        assert!(text.contains(&format!("{}_bucket", QUERY_DURATION)));
        assert!(text.contains(REPLICA_LAG));
        assert!(text.contains(ACTIVE_CONNECTIONS));
    }

    #[test]
    fn test_routers_do_not_share_metrics() {
        let a = RouterMetrics::new();
        let b = RouterMetrics::new();
        a.record_replica_fallback();

        assert!(a.render().contains(REPLICA_FALLBACKS_TOTAL));
        assert!(!b.render().contains(&format!("{} 1", REPLICA_FALLBACKS_TOTAL)));
    }
}
