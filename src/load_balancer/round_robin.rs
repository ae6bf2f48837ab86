//! Round-robin replica selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{node::NodeState, ReplicaBalancer};

/// Round-robin selector.
///
/// One shared counter advances on every pick and is reduced modulo the size
/// of whatever set is eligible at that moment. When replicas flap in and out
/// of the eligible set the spread is only roughly uniform and some nodes may
/// be skipped for a turn; that is accepted.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplicaBalancer for RoundRobin {
    fn pick(&self, eligible: &[Arc<NodeState>]) -> Option<Arc<NodeState>> {
        if eligible.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % eligible.len();
        Some(eligible[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::node::{testing::memory_node, NodeRole};

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let (r1, _) = memory_node("replica-1", NodeRole::Replica, 5);
        let (r2, _) = memory_node("replica-2", NodeRole::Replica, 5);
        let replicas = vec![r1.clone(), r2.clone()];

        let s1 = lb.pick(&replicas).unwrap();
        assert_eq!(s1.name(), r1.name());

        let s2 = lb.pick(&replicas).unwrap();
        assert_eq!(s2.name(), r2.name());

        let s3 = lb.pick(&replicas).unwrap();
        assert_eq!(s3.name(), r1.name());
    }

    #[test]
    fn test_counter_is_shared_across_set_sizes() {
        let lb = RoundRobin::new();
        let (r1, _) = memory_node("replica-1", NodeRole::Replica, 5);
        let (r2, _) = memory_node("replica-2", NodeRole::Replica, 5);
        let (r3, _) = memory_node("replica-3", NodeRole::Replica, 5);

        // counter 0 over three nodes, then 1 over two: r2 is picked, r1 skipped.
        assert_eq!(lb.pick(&[r1.clone(), r2.clone(), r3.clone()]).unwrap().name(), r1.name());
        assert_eq!(lb.pick(&[r1.clone(), r2.clone()]).unwrap().name(), r2.name());
        assert!(lb.pick(&[]).is_none());
    }
}
