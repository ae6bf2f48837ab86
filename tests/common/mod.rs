//! Shared utilities for integration tests: routers over in-memory pools.

#![allow(dead_code)]

use std::sync::Arc;

use db_router::config::{NodeConfig, ReadPreference, RouterConfig};
use db_router::pool::memory::{MemoryPool, MemoryPoolFactory};
use db_router::{NodeStats, QueryResult, Router, SqlValue};

pub const PRIMARY: &str = "primary:5432";

/// Address of the `n`th replica (1-based).
pub fn replica(n: usize) -> String {
    format!("replica-{}:5432", n)
}

/// A primary plus `replicas` replicas with default thresholds.
pub fn router_config(replicas: usize, preference: ReadPreference) -> RouterConfig {
    RouterConfig {
        primary: NodeConfig::new("primary", 5432),
        replicas: (1..=replicas)
            .map(|n| NodeConfig::new(format!("replica-{}", n), 5432))
            .collect(),
        read_preference: preference,
        ..RouterConfig::default()
    }
}

pub struct TestCluster {
    pub router: Arc<Router>,
    pub factory: MemoryPoolFactory,
}

impl TestCluster {
    /// Build the router without starting it, so faults can be injected
    /// before the initial health check.
    pub fn build(config: RouterConfig) -> Self {
        let factory = MemoryPoolFactory::new();
        let router = Arc::new(Router::new(config, &factory).unwrap());
        Self { router, factory }
    }

    pub async fn start(config: RouterConfig) -> Self {
        let cluster = Self::build(config);
        cluster.router.start().await.unwrap();
        cluster
    }

    pub fn pool(&self, address: &str) -> MemoryPool {
        self.factory.pool(address)
    }

    pub fn node(&self, address: &str) -> NodeStats {
        self.router
            .stats()
            .into_iter()
            .find(|node| node.name == address)
            .unwrap()
    }
}

/// Which node answered a read (in-memory pools answer with their address).
pub fn served_by(result: &QueryResult) -> String {
    result
        .scalar()
        .and_then(SqlValue::as_str)
        .unwrap()
        .to_string()
}
