//! Lowest-latency replica selection.

use std::sync::Arc;

use crate::load_balancer::{node::NodeState, ReplicaBalancer};

/// Nearest selector.
/// Selects the replica with the lowest latency from its last successful probe.
#[derive(Debug, Default)]
pub struct Nearest;

impl Nearest {
    pub fn new() -> Self {
        Self
    }
}

impl ReplicaBalancer for Nearest {
    fn pick(&self, eligible: &[Arc<NodeState>]) -> Option<Arc<NodeState>> {
        // In case of tie, the first one is selected (list order)
        eligible.iter().min_by_key(|n| n.latency_ms()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::node::{testing::memory_node, NodeRole};

    #[test]
    fn test_nearest() {
        let lb = Nearest::new();
        let (r1, _) = memory_node("replica-1", NodeRole::Replica, 5);
        let (r2, _) = memory_node("replica-2", NodeRole::Replica, 5);
        let (r3, _) = memory_node("replica-3", NodeRole::Replica, 5);
        r1.mark_healthy(30, Some(0));
        r2.mark_healthy(10, Some(0));
        r3.mark_healthy(20, Some(0));

        let replicas = vec![r1.clone(), r2.clone(), r3.clone()];
        assert_eq!(lb.pick(&replicas).unwrap().name(), r2.name());

        r3.mark_healthy(5, Some(0));
        assert_eq!(lb.pick(&replicas).unwrap().name(), r3.name());
    }

    #[test]
    fn test_tie_goes_to_list_order() {
        let lb = Nearest::new();
        let (r1, _) = memory_node("replica-1", NodeRole::Replica, 5);
        let (r2, _) = memory_node("replica-2", NodeRole::Replica, 5);
        r1.mark_healthy(8, Some(0));
        r2.mark_healthy(8, Some(0));

        assert_eq!(lb.pick(&[r2.clone(), r1.clone()]).unwrap().name(), r2.name());
        assert!(lb.pick(&[]).is_none());
    }
}
