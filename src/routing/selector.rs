//! Node selection.
//!
//! # Responsibilities
//! - Pin writes (and forced-writable reads) to the primary
//! - Filter replicas by health, circuit state and replication lag
//! - Apply the read preference to the eligible set
//! - Fall back to the primary when no replica is eligible
//!
//! # Design Decisions
//! - Writes go to the primary unconditionally, even when it is unhealthy or
//!   its circuit is open; there is no failover for writes
//! - An empty eligible set is a degraded read path (warning), not an error
//! - Open circuits are closed lazily here, while the eligible set is built

use std::sync::Arc;

use crate::config::{ReadPreference, RouterConfig};
use crate::load_balancer::{balancer_for, node::NodeState, ReplicaBalancer};
use crate::observability::metrics::RouterMetrics;
use crate::query::QueryOptions;
use crate::routing::classifier::QueryKind;

/// Picks the node that serves a statement.
#[derive(Debug)]
pub struct NodeSelector {
    primary: Arc<NodeState>,
    replicas: Vec<Arc<NodeState>>,
    preference: ReadPreference,
    max_replica_lag_ms: u64,
    balancer: Box<dyn ReplicaBalancer>,
    metrics: Arc<RouterMetrics>,
}

impl NodeSelector {
    pub fn new(
        primary: Arc<NodeState>,
        replicas: Vec<Arc<NodeState>>,
        config: &RouterConfig,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            primary,
            replicas,
            preference: config.read_preference,
            max_replica_lag_ms: config.max_replica_lag_ms,
            balancer: balancer_for(config.read_preference),
            metrics,
        }
    }

    pub fn primary(&self) -> &Arc<NodeState> {
        &self.primary
    }

    pub fn replicas(&self) -> &[Arc<NodeState>] {
        &self.replicas
    }

    /// Choose the node for a classified statement.
    pub fn select(&self, kind: QueryKind, options: &QueryOptions) -> Arc<NodeState> {
        if kind.is_write() || options.force_writable {
            return self.primary.clone();
        }
        if self.replicas.is_empty() || self.preference == ReadPreference::Primary {
            return self.primary.clone();
        }

        let eligible = self.eligible(options, None);
        match self.balancer.pick(&eligible) {
            Some(node) => node,
            None => {
                tracing::warn!(
                    replicas = self.replicas.len(),
                    max_replica_lag_ms = self.max_replica_lag_ms,
                    allow_stale = options.allow_stale,
                    "No eligible replica, reading from primary"
                );
                self.metrics.record_replica_fallback();
                self.primary.clone()
            }
        }
    }

    /// Another eligible replica to try when `rejected` refused a read.
    pub fn alternate(&self, rejected: &NodeState, options: &QueryOptions) -> Option<Arc<NodeState>> {
        let eligible = self.eligible(options, Some(rejected.name()));
        self.balancer.pick(&eligible)
    }

    fn eligible(&self, options: &QueryOptions, exclude: Option<&str>) -> Vec<Arc<NodeState>> {
        self.replicas
            .iter()
            .filter(|node| exclude != Some(node.name()))
            .filter(|node| node.accepts_reads(self.max_replica_lag_ms, options.allow_stale))
            .cloned()
            .collect()
    }
}
