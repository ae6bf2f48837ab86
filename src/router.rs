//! The router facade.
//!
//! # Responsibilities
//! - Build one `NodeState` per configured node from a pool factory
//! - Own the selector, executor, transaction coordinator and health monitor
//! - Start and stop the background health monitor
//! - Expose stats and metrics for operators
//!
//! Construct one `Router` and pass it (usually behind an `Arc`) to whoever
//! needs it. Tests build a fresh router instead of resetting shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::validation::validate_config;
use crate::config::{NodeConfig, RouterConfig};
use crate::error::RouterError;
use crate::health::active::HealthMonitor;
use crate::lifecycle::Shutdown;
use crate::load_balancer::node::{NodeRole, NodeState, NodeStats};
use crate::observability::metrics::RouterMetrics;
use crate::pool::{NodePool, PoolFactory, QueryResult, SqlValue};
use crate::query::{QueryExecutor, QueryOptions, TransactionCoordinator, TxConnection};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::routing::selector::NodeSelector;
use futures_util::future::BoxFuture;

/// Primary/replica query router.
#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    primary: Arc<NodeState>,
    replicas: Vec<Arc<NodeState>>,
    executor: QueryExecutor,
    transactions: TransactionCoordinator,
    monitor: HealthMonitor,
    metrics: Arc<RouterMetrics>,
    shutdown: Shutdown,
    started: AtomicBool,
    /// Background monitor; the lock also serializes start against stop.
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Validate `config` and build a pool for every node. Pools connect
    /// lazily; nothing touches the network until [`Router::start`].
    pub fn new(config: RouterConfig, factory: &dyn PoolFactory) -> Result<Self, RouterError> {
        validate_config(&config).map_err(RouterError::InvalidConfig)?;

        let build = |role: NodeRole, node: &NodeConfig| -> Result<Arc<NodeState>, RouterError> {
            let pool = NodePool::new(factory.create(node)?, node.connect_timeout());
            let breaker = CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_reset());
            Ok(Arc::new(NodeState::new(role, node.clone(), pool, breaker)))
        };

        let primary = build(NodeRole::Primary, &config.primary)?;
        let replicas = config
            .replicas
            .iter()
            .map(|node| build(NodeRole::Replica, node))
            .collect::<Result<Vec<_>, _>>()?;

        let metrics = Arc::new(RouterMetrics::new());
        let selector = Arc::new(NodeSelector::new(
            primary.clone(),
            replicas.clone(),
            &config,
            metrics.clone(),
        ));
        let mut nodes = Vec::with_capacity(replicas.len() + 1);
        nodes.push(primary.clone());
        nodes.extend(replicas.iter().cloned());

        tracing::info!(
            primary = %primary.name(),
            replicas = replicas.len(),
            read_preference = ?config.read_preference,
            "Router configured"
        );

        Ok(Self {
            executor: QueryExecutor::new(selector, metrics.clone()),
            transactions: TransactionCoordinator::new(primary.clone(), metrics.clone()),
            monitor: HealthMonitor::new(
                nodes,
                config.health_check_interval(),
                config.health_check_timeout(),
                metrics.clone(),
            ),
            config,
            primary,
            replicas,
            metrics,
            shutdown: Shutdown::new(),
            started: AtomicBool::new(false),
            monitor_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Check every node once, then keep checking in the background.
    ///
    /// Calling this on a running router does nothing. A stopped router
    /// cannot be started again.
    pub async fn start(&self) -> Result<(), RouterError> {
        let mut monitor_task = self.monitor_task.lock().await;
        if self.shutdown.is_triggered() {
            return Err(RouterError::NoEligibleNode);
        }
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.monitor.check_all().await;
        let monitor = self.monitor.clone();
        *monitor_task = Some(tokio::spawn(monitor.run(self.shutdown.subscribe())));
        self.started.store(true, Ordering::SeqCst);

        let healthy = self.stats().iter().filter(|node| node.healthy).count();
        tracing::info!(nodes = self.replicas.len() + 1, healthy, "Router started");
        Ok(())
    }

    /// Stop health checking and close every pool. Idempotent.
    pub async fn stop(&self) {
        let mut monitor_task = self.monitor_task.lock().await;
        let listeners = self.shutdown.receiver_count();
        if !self.shutdown.trigger() {
            return;
        }
        tracing::debug!(listeners, "Shutdown signalled");

        if let Some(task) = monitor_task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Health monitor task failed");
            }
        }
        for node in self.nodes() {
            node.pool().close().await;
        }
        self.started.store(false, Ordering::SeqCst);
        tracing::info!("Router stopped");
    }

    /// Route and run one statement.
    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        options: QueryOptions,
    ) -> Result<QueryResult, RouterError> {
        if self.shutdown.is_triggered() {
            return Err(RouterError::NoEligibleNode);
        }
        self.executor.execute(sql, params, &options).await
    }

    /// Run `f` inside a transaction on the primary.
    ///
    /// ```ignore
    /// let id = router
    ///     .transaction(|tx| Box::pin(async move {
    ///         let row = tx.execute("INSERT INTO orders (total) VALUES ($1) RETURNING id", &[total.into()]).await?;
    ///         tx.execute("UPDATE stock SET qty = qty - 1 WHERE sku = $1", &[sku.into()]).await?;
    ///         Ok(row.scalar().and_then(SqlValue::as_i64))
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, RouterError>
    where
        F: for<'c> FnOnce(&'c mut TxConnection) -> BoxFuture<'c, Result<T, RouterError>>,
    {
        if self.shutdown.is_triggered() {
            return Err(RouterError::NoEligibleNode);
        }
        self.transactions.run(f).await
    }

    /// Run one health check of every node now.
    pub async fn check_health(&self) {
        self.monitor.check_all().await;
    }

    /// Snapshot of every node, primary first.
    pub fn stats(&self) -> Vec<NodeStats> {
        self.nodes().map(|node| node.stats()).collect()
    }

    /// Metrics in the Prometheus text format.
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_triggered()
    }

    fn nodes(&self) -> impl Iterator<Item = &Arc<NodeState>> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }
}
