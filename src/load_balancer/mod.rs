//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Read routed to replicas
//!     → node.rs (filter: healthy, circuit closed, lag within bound)
//!     → Apply read preference:
//!         - round_robin.rs (rotate through eligible replicas)
//!         - nearest.rs (pick replica with lowest probe latency)
//!     → Return chosen node, or None if nothing is eligible
//! ```
//!
//! # Design Decisions
//! - Balancers are stateless apart from the round-robin counter; node state
//!   lives in `NodeState`
//! - Balancers only see the eligible set; filtering happens in the selector
//! - One balancer per router, shared by every read

pub mod nearest;
pub mod node;
pub mod round_robin;

use std::fmt;
use std::sync::Arc;

use crate::config::ReadPreference;
use node::NodeState;

/// Strategy for choosing among eligible replicas.
pub trait ReplicaBalancer: Send + Sync + fmt::Debug {
    fn pick(&self, eligible: &[Arc<NodeState>]) -> Option<Arc<NodeState>>;
}

/// Balancer for a read preference. `Primary` never consults one, but still
/// gets round-robin so alternates can be chosen.
pub fn balancer_for(preference: ReadPreference) -> Box<dyn ReplicaBalancer> {
    match preference {
        ReadPreference::Nearest => Box::new(nearest::Nearest::new()),
        ReadPreference::Replica | ReadPreference::Primary => Box::new(round_robin::RoundRobin::new()),
    }
}
