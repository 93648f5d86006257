//! 副本放置策略：为每个块挑选存放副本的主机。

use super::HostId;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chooses the hosts that receive the replicas of one block.
///
/// Implementations must return distinct hosts and never more than
/// `replication` of them. Returning fewer is allowed when the pool is too
/// small; the caller reports the shortfall.
pub trait PlacementPolicy: Send + Sync {
    fn choose_targets(&self, pool: &[HostId], replication: usize) -> Vec<HostId>;
}

/// Round-robin over the registered pool. Consecutive blocks start one host
/// further along, so replicas spread evenly across the pool.
#[derive(Debug, Default)]
pub struct RoundRobinPlacement {
    cursor: AtomicUsize,
}

impl RoundRobinPlacement {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlacementPolicy for RoundRobinPlacement {
    fn choose_targets(&self, pool: &[HostId], replication: usize) -> Vec<HostId> {
        if pool.is_empty() || replication == 0 {
            return Vec::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let take = replication.min(pool.len());
        (0..take)
            .map(|i| pool[(start + i) % pool.len()].clone())
            .collect()
    }
}

/// Recorded when fewer hosts than the replication factor were available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaShortfall {
    pub requested: usize,
    pub placed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pool(n: usize) -> Vec<HostId> {
        (0..n).map(|i| HostId::new(format!("dn-{i}"))).collect()
    }

    #[test]
    fn test_round_robin_distinct_and_rotating() {
        let policy = RoundRobinPlacement::new();
        let hosts = pool(4);
        let first = policy.choose_targets(&hosts, 3);
        let second = policy.choose_targets(&hosts, 3);
        assert_eq!(first.len(), 3);
        assert_eq!(first.iter().collect::<HashSet<_>>().len(), 3);
        assert_eq!(first[0].as_str(), "dn-0");
        assert_eq!(second[0].as_str(), "dn-1");
        assert_eq!(second[2].as_str(), "dn-3");
    }

    #[test]
    fn test_small_pool_caps_replicas() {
        let policy = RoundRobinPlacement::new();
        let targets = policy.choose_targets(&pool(2), 3);
        assert_eq!(targets.len(), 2);
        assert_ne!(targets[0], targets[1]);
        assert!(policy.choose_targets(&[], 3).is_empty());
    }
}
