//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, pools non-empty)
//! - Detect nodes configured twice
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before the router builds any pool

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::{NodeConfig, RouterConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{node}: host must not be empty")]
    EmptyHost { node: String },

    #[error("{node}: port must not be 0")]
    ZeroPort { node: String },

    #[error("{node}: database name must not be empty")]
    EmptyDatabase { node: String },

    #[error("{node}: max_connections must be at least 1")]
    ZeroMaxConnections { node: String },

    #[error("{node}: configured more than once")]
    DuplicateNode { node: String },

    #[error("circuit_breaker_threshold must be at least 1")]
    ZeroCircuitThreshold,

    #[error("health_check_interval_ms must be greater than 0")]
    ZeroHealthCheckInterval,

    #[error("health_check_timeout_ms ({timeout_ms}) must be shorter than health_check_interval_ms ({interval_ms})")]
    ProbeTimeoutTooLong { timeout_ms: u64, interval_ms: u64 },
}

/// Validate a router configuration, collecting every error.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    let nodes = std::iter::once(("primary", &config.primary))
        .chain(config.replicas.iter().map(|r| ("replica", r)));

    for (role, node) in nodes {
        validate_node(role, node, &mut errors);
        let address = node.address();
        if !seen.insert(address.clone()) {
            errors.push(ValidationError::DuplicateNode { node: address });
        }
    }

    if config.circuit_breaker_threshold == 0 {
        errors.push(ValidationError::ZeroCircuitThreshold);
    }

    if config.health_check_interval_ms == 0 {
        errors.push(ValidationError::ZeroHealthCheckInterval);
    } else if config.health_check_timeout_ms >= config.health_check_interval_ms {
        errors.push(ValidationError::ProbeTimeoutTooLong {
            timeout_ms: config.health_check_timeout_ms,
            interval_ms: config.health_check_interval_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_node(role: &str, node: &NodeConfig, errors: &mut Vec<ValidationError>) {
    let label = format!("{} {}", role, node.address());

    if node.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost { node: label.clone() });
    }
    if node.port == 0 {
        errors.push(ValidationError::ZeroPort { node: label.clone() });
    }
    if node.database.trim().is_empty() {
        errors.push(ValidationError::EmptyDatabase { node: label.clone() });
    }
    if node.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections { node: label });
    }
}
