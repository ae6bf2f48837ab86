//! Database node abstraction.
//!
//! # Responsibilities
//! - Represent a single database node (primary or replica)
//! - Own the node's connection pool
//! - Track health, latency and replication lag (written by the monitor)
//! - Carry the node's circuit breaker (driven by the executor)
//!
//! Health and breaker each sit behind their own per-node lock, so health
//! checks never serialize against query routing or against other nodes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::NodeConfig;
use crate::health::state::NodeHealth;
use crate::pool::{NodePool, PoolStats};
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Role of a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Primary,
    Replica,
}

/// Operational snapshot of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStats {
    pub name: String,
    pub host: String,
    pub role: NodeRole,
    pub healthy: bool,
    pub latency_ms: u64,
    /// Present for replicas only.
    pub lag_ms: Option<u64>,
    pub circuit_open: bool,
    pub consecutive_failures: u32,
    pub last_check_at: Option<DateTime<Utc>>,
    pub pool: PoolStats,
}

/// A single database node and its mutable routing state.
#[derive(Debug)]
pub struct NodeState {
    name: String,
    role: NodeRole,
    config: NodeConfig,
    pool: NodePool,
    health: RwLock<NodeHealth>,
    breaker: CircuitBreaker,
}

impl NodeState {
    pub fn new(role: NodeRole, config: NodeConfig, pool: NodePool, breaker: CircuitBreaker) -> Self {
        Self {
            name: config.address(),
            role,
            config,
            pool,
            health: RwLock::new(NodeHealth::default()),
            breaker,
        }
    }

    /// `host:port`, used as the node's label everywhere.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_primary(&self) -> bool {
        self.role == NodeRole::Primary
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn read_health(&self) -> RwLockReadGuard<'_, NodeHealth> {
        self.health.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_health(&self) -> RwLockWriteGuard<'_, NodeHealth> {
        self.health.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Health Logic ---

    pub fn health(&self) -> NodeHealth {
        *self.read_health()
    }

    pub fn is_healthy(&self) -> bool {
        self.read_health().healthy
    }

    pub fn latency_ms(&self) -> u64 {
        self.read_health().latency_ms
    }

    /// Report a successful probe. Lag is ignored on the primary.
    pub fn mark_healthy(&self, latency_ms: u64, lag_ms: Option<u64>) {
        let lag_ms = if self.is_primary() { None } else { lag_ms };
        self.write_health().record_success(latency_ms, lag_ms, Utc::now());
    }

    /// Report a failed probe.
    pub fn mark_unhealthy(&self) {
        self.write_health().record_failure(Utc::now());
    }

    /// Whether this replica may serve a read right now.
    ///
    /// The breaker is consulted last, so an open circuit is only lazily
    /// closed for a node that is otherwise eligible.
    pub fn accepts_reads(&self, max_lag_ms: u64, allow_stale: bool) -> bool {
        let health = self.health();
        if !health.healthy {
            return false;
        }
        if !allow_stale && health.lag_ms > max_lag_ms {
            return false;
        }
        self.breaker.allow_request()
    }

    pub fn stats(&self) -> NodeStats {
        let health = self.health();
        let breaker = self.breaker.snapshot();
        NodeStats {
            name: self.name.clone(),
            host: self.config.host.clone(),
            role: self.role,
            healthy: health.healthy,
            latency_ms: health.latency_ms,
            lag_ms: (!self.is_primary()).then_some(health.lag_ms),
            circuit_open: breaker.open,
            consecutive_failures: breaker.consecutive_failures,
            last_check_at: health.last_check_at,
            pool: self.pool.stats(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::memory_node;
    use super::*;

    #[test]
    fn test_replica_eligibility() {
        let (node, _) = memory_node("replica-1", NodeRole::Replica, 2);
        assert!(node.accepts_reads(1000, false), "healthy before the first probe");

        node.mark_healthy(5, Some(2000));
        assert!(!node.accepts_reads(1000, false));
        assert!(node.accepts_reads(1000, true));
        assert!(node.accepts_reads(2000, false));

        node.mark_unhealthy();
        assert!(!node.accepts_reads(5000, true));
    }

    #[tokio::test]
    async fn test_open_circuit_is_ineligible() {
        let (node, _) = memory_node("replica-1", NodeRole::Replica, 2);
        node.breaker().record_failure();
        node.breaker().record_failure();
        assert!(!node.accepts_reads(1000, true));
    }

    #[test]
    fn test_stats_hide_lag_for_primary() {
        let (primary, _) = memory_node("primary", NodeRole::Primary, 2);
        primary.mark_healthy(4, Some(999));

        let stats = primary.stats();
        assert_eq!(stats.name, "primary:5432");
        assert_eq!(stats.host, "primary");
        assert_eq!(stats.lag_ms, None);
        assert_eq!(primary.health().lag_ms, 0);
        assert!(stats.last_check_at.is_some());

        let (replica, _) = memory_node("replica-1", NodeRole::Replica, 2);
        replica.mark_healthy(7, Some(120));
        assert_eq!(replica.stats().lag_ms, Some(120));
    }
}
