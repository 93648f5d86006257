//! 面向调用方的条目视图：FileStatus 与块位置。

use super::inode::{FileState, INode, INodeKind, InodeId, Permission};
use crate::block::{Block, BlockId, HostId};
use crate::path::DfsPath;
use serde::Serialize;
use std::num::{NonZeroU16, NonZeroU64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    File,
    Directory,
}

/// Attributes of one entry, as returned by `stat` and `listStatus`.
///
/// `replication` and `block_size` are zero for directories, mirroring what
/// HDFS reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: DfsPath,
    pub ino: InodeId,
    pub kind: FileKind,
    pub length: u64,
    pub permission: Permission,
    pub owner: String,
    pub group: String,
    pub modification_time: i64,
    pub access_time: i64,
    pub replication: u16,
    pub block_size: u64,
    pub state: Option<FileState>,
}

impl FileStatus {
    pub fn from_inode(path: DfsPath, node: &INode) -> Self {
        let (kind, length, replication, block_size, state) = match &node.kind {
            INodeKind::Directory { .. } => (FileKind::Directory, 0, 0, 0, None),
            INodeKind::File(meta) => (
                FileKind::File,
                meta.length,
                meta.replication.get(),
                meta.block_size.get(),
                Some(meta.state),
            ),
        };
        Self {
            path,
            ino: node.id,
            kind,
            length,
            permission: node.attrs.permission,
            owner: node.attrs.owner.clone(),
            group: node.attrs.group.clone(),
            modification_time: node.attrs.mtime,
            access_time: node.attrs.atime,
            replication,
            block_size,
            state,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }
}

/// Placement of one block inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockLocation {
    pub block: BlockId,
    pub offset: u64,
    pub length: u64,
    pub hosts: Vec<HostId>,
}

impl BlockLocation {
    /// Turn blocks in write order into located ranges.
    pub fn from_blocks(blocks: &[Block]) -> Vec<BlockLocation> {
        let mut offset = 0;
        blocks
            .iter()
            .map(|b| {
                let loc = BlockLocation {
                    block: b.id,
                    offset,
                    length: b.length,
                    hosts: b.replicas.clone(),
                };
                offset += b.length;
                loc
            })
            .collect()
    }
}

/// A file status together with where its blocks live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedFileStatus {
    #[serde(flatten)]
    pub status: FileStatus,
    pub blocks: Vec<BlockLocation>,
}

/// Open file reference handed out by `createFile` / `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub ino: InodeId,
    pub path: DfsPath,
    pub block_size: NonZeroU64,
    pub replication: NonZeroU16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_locations_accumulate_offsets() {
        let blocks = vec![
            Block {
                id: BlockId(1),
                length: 128,
                replicas: vec![HostId::new("dn-0")],
                checksum: None,
            },
            Block {
                id: BlockId(2),
                length: 44,
                replicas: vec![HostId::new("dn-1"), HostId::new("dn-2")],
                checksum: None,
            },
        ];
        let locs = BlockLocation::from_blocks(&blocks);
        assert_eq!(locs[0].offset, 0);
        assert_eq!(locs[1].offset, 128);
        assert_eq!(locs[1].length, 44);
        assert_eq!(locs[1].hosts.len(), 2);
    }
}
