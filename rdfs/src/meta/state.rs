//! 命名空间 + 块表，作为一个整体做版本化。

use super::inode::{FileState, Identity, INodeKind, InodeId};
use super::namespace::Namespace;
use super::status::{BlockLocation, FileHandle, FileStatus, LocatedFileStatus};
use crate::block::{
    Block, BlockId, BlockIndex, HostId, PlacementPolicy, ReplicaShortfall, split_into_blocks,
};
use crate::error::{DfsError, Op, Result};
use crate::path::DfsPath;
use std::sync::Arc;

pub type MetaSnapshot = Arc<MetaState>;

/// Result of `allocateBlocks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub blocks: Vec<Block>,
    /// Set when the host pool could not satisfy the replication factor.
    pub shortfall: Option<ReplicaShortfall>,
}

/// What a writer reports back for one block when finalizing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBlock {
    pub id: BlockId,
    pub checksum: String,
    /// Hosts that acknowledged the write.
    pub replicas: Vec<HostId>,
}

#[derive(Debug, Clone)]
pub struct MetaState {
    pub namespace: Namespace,
    pub blocks: BlockIndex,
}

impl MetaState {
    pub fn new(superuser: &Identity, now: i64) -> Self {
        Self {
            namespace: Namespace::new(superuser, now),
            blocks: BlockIndex::new(),
        }
    }

    /// Split `length` into blocks for an under-construction file and place
    /// their replicas.
    pub fn allocate_blocks(
        &mut self,
        file: &FileHandle,
        length: u64,
        pool: &[HostId],
        policy: &dyn PlacementPolicy,
    ) -> Result<Allocation> {
        let op = Op::AllocateBlocks;
        let (_, meta) = self.namespace.file_mut(op, file)?;
        if meta.state != FileState::UnderConstruction {
            return Err(DfsError::transfer(op, &file.path, "file is not under construction"));
        }
        if meta.length % meta.block_size.get() != 0 {
            return Err(DfsError::transfer(op, &file.path, "last block is already partial"));
        }
        let spans = split_into_blocks(length, meta.block_size);
        let replication = meta.replication.get() as usize;
        let (blocks, shortfall) = self.blocks.allocate(&spans, replication, pool, policy);
        meta.blocks.extend(blocks.iter().map(|b| b.id));
        meta.length += length;
        Ok(Allocation { blocks, shortfall })
    }

    /// Blocks of a file in write order.
    pub fn locate(&self, file: &FileHandle) -> Result<Vec<Block>> {
        let meta = self.namespace.file(Op::Locate, file)?;
        Ok(self.blocks.locate(&meta.blocks))
    }

    /// Finalize a file: record checksums and acknowledged replicas.
    pub fn complete(
        &mut self,
        file: &FileHandle,
        committed: Vec<CommittedBlock>,
        now: i64,
    ) -> Result<()> {
        let op = Op::Complete;
        let (attrs, meta) = self.namespace.file_mut(op, file)?;
        if meta.state != FileState::UnderConstruction {
            return Err(DfsError::transfer(op, &file.path, "file is not under construction"));
        }
        let matches = committed.len() == meta.blocks.len()
            && committed.iter().zip(&meta.blocks).all(|(c, id)| c.id == *id);
        if !matches {
            return Err(DfsError::transfer(op, &file.path, "committed block list does not match"));
        }
        meta.state = FileState::Complete;
        attrs.mtime = now;
        attrs.atime = now;
        for block in committed {
            self.blocks.commit(block.id, block.checksum, block.replicas);
        }
        Ok(())
    }

    pub fn mark_corrupt(&mut self, file: &FileHandle) -> Result<()> {
        let (_, meta) = self.namespace.file_mut(Op::MarkCorrupt, file)?;
        meta.state = FileState::Corrupt;
        Ok(())
    }

    /// Drop table entries for blocks released by the namespace.
    pub fn release(&mut self, ids: &[BlockId]) -> Vec<Block> {
        self.blocks.remove(ids)
    }

    /// Status plus block locations of the file stored at `id`.
    pub fn located_status(&self, path: DfsPath, id: InodeId) -> Option<LocatedFileStatus> {
        let node = self.namespace.get(id)?;
        let blocks = match &node.kind {
            INodeKind::File(meta) => self.blocks.locate(&meta.blocks),
            INodeKind::Directory { .. } => Vec::new(),
        };
        Some(LocatedFileStatus {
            status: FileStatus::from_inode(path, node),
            blocks: BlockLocation::from_blocks(&blocks),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::RoundRobinPlacement;
    use crate::error::ErrorKind;
    use std::num::{NonZeroU16, NonZeroU64};

    fn pool(n: usize) -> Vec<HostId> {
        (0..n).map(|i| HostId::new(format!("dn-{i}"))).collect()
    }

    fn setup(replication: u16) -> (MetaState, FileHandle) {
        let mut state = MetaState::new(&Identity::new("hdfs"), 0);
        let (handle, _) = state
            .namespace
            .create_file(
                &DfsPath::parse("/f.txt").unwrap(),
                NonZeroU64::new(128).unwrap(),
                NonZeroU16::new(replication).unwrap(),
                false,
                &Identity::new("atguigu"),
                1,
            )
            .unwrap();
        (state, handle)
    }

    fn commit_all(blocks: &[Block]) -> Vec<CommittedBlock> {
        blocks
            .iter()
            .map(|b| CommittedBlock {
                id: b.id,
                checksum: format!("sum-{}", b.id.0),
                replicas: b.replicas.clone(),
            })
            .collect()
    }

    #[test]
    fn test_allocate_300_bytes_in_128_byte_blocks() {
        let (mut state, handle) = setup(2);
        let alloc = state
            .allocate_blocks(&handle, 300, &pool(3), &RoundRobinPlacement::new())
            .unwrap();
        assert!(alloc.shortfall.is_none());
        let lens: Vec<u64> = alloc.blocks.iter().map(|b| b.length).collect();
        assert_eq!(lens, vec![128, 128, 44]);
        assert_eq!(state.namespace.stat(&handle.path).unwrap().length, 300);
        assert_eq!(state.locate(&handle).unwrap(), alloc.blocks);
    }

    #[test]
    fn test_allocate_after_partial_block_is_rejected() {
        let (mut state, handle) = setup(1);
        let policy = RoundRobinPlacement::new();
        state.allocate_blocks(&handle, 256, &pool(1), &policy).unwrap();
        state.allocate_blocks(&handle, 10, &pool(1), &policy).unwrap();
        let err = state
            .allocate_blocks(&handle, 10, &pool(1), &policy)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert_eq!(state.locate(&handle).unwrap().len(), 3);
    }

    #[test]
    fn test_shortfall_is_reported() {
        let (mut state, handle) = setup(3);
        let alloc = state
            .allocate_blocks(&handle, 10, &pool(2), &RoundRobinPlacement::new())
            .unwrap();
        assert_eq!(
            alloc.shortfall,
            Some(ReplicaShortfall {
                requested: 3,
                placed: 2
            })
        );
    }

    #[test]
    fn test_complete_records_checksums_and_freezes() {
        let (mut state, handle) = setup(1);
        let policy = RoundRobinPlacement::new();
        let alloc = state.allocate_blocks(&handle, 200, &pool(1), &policy).unwrap();
        state.complete(&handle, commit_all(&alloc.blocks), 9).unwrap();
        let located = state.locate(&handle).unwrap();
        assert!(located.iter().all(|b| b.checksum.is_some()));
        let st = state.namespace.stat(&handle.path).unwrap();
        assert_eq!(st.state, Some(FileState::Complete));
        assert_eq!(st.modification_time, 9);

        let err = state.allocate_blocks(&handle, 1, &pool(1), &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
    }

    #[test]
    fn test_complete_rejects_mismatched_blocks() {
        let (mut state, handle) = setup(1);
        let alloc = state
            .allocate_blocks(&handle, 300, &pool(1), &RoundRobinPlacement::new())
            .unwrap();
        let mut committed = commit_all(&alloc.blocks);
        committed.pop();
        let err = state.complete(&handle, committed, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        state.mark_corrupt(&handle).unwrap();
        assert_eq!(
            state.namespace.stat(&handle.path).unwrap().state,
            Some(FileState::Corrupt)
        );
    }

    #[test]
    fn test_located_status_for_file() {
        let (mut state, handle) = setup(2);
        state
            .allocate_blocks(&handle, 130, &pool(2), &RoundRobinPlacement::new())
            .unwrap();
        let located = state
            .located_status(handle.path.clone(), handle.ino)
            .unwrap();
        assert_eq!(located.blocks.len(), 2);
        assert_eq!(located.blocks[1].offset, 128);
        assert_eq!(located.blocks[1].length, 2);
        assert_eq!(located.blocks[0].hosts.len(), 2);
    }
}
