//! Configuration schema definitions.
//!
//! This module defines the configuration consumed by the router and by the
//! `db-router` binary. All types derive Serde traits for deserialization
//! from config files; durations are expressed in milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the `db-router` service binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Primary/replica routing settings.
    pub router: RouterConfig,

    /// Admin and metrics HTTP surface.
    pub admin: AdminConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Fully-resolved router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// The single writable node.
    pub primary: NodeConfig,

    /// Read replicas, in preference order for tie-breaking.
    pub replicas: Vec<NodeConfig>,

    /// Maximum replication lag a read tolerates unless `allow_stale` is set.
    pub max_replica_lag_ms: u64,

    /// Period of the background health check.
    pub health_check_interval_ms: u64,

    /// Upper bound for a single node probe. Must be shorter than the interval.
    pub health_check_timeout_ms: u64,

    /// How reads are spread over eligible replicas.
    pub read_preference: ReadPreference,

    /// Consecutive failures before a node's circuit opens.
    pub circuit_breaker_threshold: u32,

    /// Cool-down before an open circuit is closed again.
    pub circuit_breaker_reset_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary: NodeConfig::default(),
            replicas: Vec::new(),
            max_replica_lag_ms: 5_000,
            health_check_interval_ms: 10_000,
            health_check_timeout_ms: 2_000,
            read_preference: ReadPreference::default(),
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_ms: 30_000,
        }
    }
}

impl RouterConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn circuit_breaker_reset(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_reset_ms)
    }
}

/// Connection parameters for one database node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,

    /// Require TLS for connections to this node.
    pub tls: bool,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// Idle connections are closed after this long.
    pub idle_timeout_ms: u64,

    /// Bound on acquiring a pooled connection.
    pub connect_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            tls: false,
            max_connections: 10,
            idle_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl NodeConfig {
    /// Build a config for `host:port`, keeping every other default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Node identifier used in logs, metrics and stats (`host:port`).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Where reads go when eligible replicas exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPreference {
    /// Always read from the primary.
    Primary,
    /// Round-robin over eligible replicas.
    #[default]
    Replica,
    /// Eligible replica with the lowest probe latency.
    Nearest,
}

/// Admin dashboard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin and metrics endpoints.
    pub enabled: bool,

    /// Bind address for the admin listener.
    pub bind_address: String,

    /// Bearer token required on `/admin/*`. `None` leaves it open.
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9187".to_string(),
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [router.primary]
            host = "db-primary"

            [[router.replicas]]
            host = "db-replica-1"
            port = 5433
            "#,
        )
        .unwrap();

        assert_eq!(config.router.primary.address(), "db-primary:5432");
        assert_eq!(config.router.replicas.len(), 1);
        assert_eq!(config.router.replicas[0].address(), "db-replica-1:5433");
        assert_eq!(config.router.replicas[0].max_connections, 10);
        assert_eq!(config.router.read_preference, ReadPreference::Replica);
        assert_eq!(config.router.circuit_breaker_threshold, 5);
        assert!(config.admin.enabled);
    }

    #[test]
    fn test_read_preference_is_lowercase() {
        let config: RouterConfig = toml::from_str(r#"read_preference = "nearest""#).unwrap();
        assert_eq!(config.read_preference, ReadPreference::Nearest);

        assert!(toml::from_str::<RouterConfig>(r#"read_preference = "Nearest""#).is_err());
    }
}
