//! 块表：记录每个块的长度、副本位置与校验和。

use super::placement::{PlacementPolicy, ReplicaShortfall};
use super::{Block, BlockId, BlockSpan, HostId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BlockIndex {
    blocks: HashMap<BlockId, Block>,
    next_id: u64,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            next_id: 1,
        }
    }

    /// Create one block per span, each placed on up to `replication` hosts.
    pub fn allocate(
        &mut self,
        spans: &[BlockSpan],
        replication: usize,
        pool: &[HostId],
        policy: &dyn PlacementPolicy,
    ) -> (Vec<Block>, Option<ReplicaShortfall>) {
        let mut out = Vec::with_capacity(spans.len());
        let mut min_placed = replication;
        for span in spans {
            let replicas = policy.choose_targets(pool, replication);
            min_placed = min_placed.min(replicas.len());
            let block = Block {
                id: BlockId(self.next_id),
                length: span.len,
                replicas,
                checksum: None,
            };
            self.next_id += 1;
            self.blocks.insert(block.id, block.clone());
            out.push(block);
        }
        let shortfall = (!spans.is_empty() && min_placed < replication).then_some(ReplicaShortfall {
            requested: replication,
            placed: min_placed,
        });
        (out, shortfall)
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Blocks for `ids`, in the given order; unknown ids are skipped.
    pub fn locate(&self, ids: &[BlockId]) -> Vec<Block> {
        ids.iter().filter_map(|id| self.blocks.get(id).cloned()).collect()
    }

    /// Record the checksum and the replicas that actually hold the bytes.
    pub fn commit(&mut self, id: BlockId, checksum: String, replicas: Vec<HostId>) -> bool {
        match self.blocks.get_mut(&id) {
            Some(block) => {
                block.checksum = Some(checksum);
                block.replicas = replicas;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, ids: &[BlockId]) -> Vec<Block> {
        ids.iter().filter_map(|id| self.blocks.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::layout::split_into_blocks;
    use crate::block::placement::RoundRobinPlacement;
    use std::num::NonZeroU64;

    fn pool(n: usize) -> Vec<HostId> {
        (0..n).map(|i| HostId::new(format!("dn-{i}"))).collect()
    }

    #[test]
    fn test_allocate_assigns_ids_and_replicas() {
        let mut index = BlockIndex::new();
        let spans = split_into_blocks(300, NonZeroU64::new(128).unwrap());
        let policy = RoundRobinPlacement::new();
        let (blocks, shortfall) = index.allocate(&spans, 2, &pool(3), &policy);
        assert!(shortfall.is_none());
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.iter().map(|b| b.length).collect::<Vec<_>>(), vec![128, 128, 44]);
        assert!(blocks.iter().all(|b| b.replicas.len() == 2));
        assert_ne!(blocks[0].id, blocks[1].id);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_allocate_reports_shortfall() {
        let mut index = BlockIndex::new();
        let spans = split_into_blocks(10, NonZeroU64::new(4).unwrap());
        let policy = RoundRobinPlacement::new();
        let (blocks, shortfall) = index.allocate(&spans, 3, &pool(1), &policy);
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            shortfall,
            Some(ReplicaShortfall {
                requested: 3,
                placed: 1
            })
        );
    }

    #[test]
    fn test_commit_and_remove() {
        let mut index = BlockIndex::new();
        let spans = split_into_blocks(5, NonZeroU64::new(8).unwrap());
        let (blocks, _) = index.allocate(&spans, 1, &pool(2), &RoundRobinPlacement::new());
        let id = blocks[0].id;
        assert!(index.commit(id, "abc".into(), vec![HostId::new("dn-1")]));
        let located = index.locate(&[id]);
        assert_eq!(located[0].checksum.as_deref(), Some("abc"));
        assert_eq!(located[0].replicas, vec![HostId::new("dn-1")]);
        assert_eq!(index.remove(&[id]).len(), 1);
        assert!(index.get(id).is_none());
        assert!(!index.commit(id, "x".into(), Vec::new()));
    }
}
