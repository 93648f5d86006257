//! 命名空间中的 INode 记录：属性、文件状态与块列表。

use crate::block::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::{NonZeroU16, NonZeroU64};

pub const DEFAULT_GROUP: &str = "supergroup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId(pub u64);

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Principal used for ownership attribution. No credentials are checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub group: String,
}

impl Identity {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: DEFAULT_GROUP.to_string(),
        }
    }

    pub fn with_group(self, group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            ..self
        }
    }
}

/// POSIX-style permission bits (lower nine bits are used).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(pub u16);

impl Permission {
    pub const DIR_DEFAULT: Permission = Permission(0o755);
    pub const FILE_DEFAULT: Permission = Permission(0o644);

    pub fn bits(&self) -> u16 {
        self.0 & 0o777
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FLAGS: [char; 3] = ['r', 'w', 'x'];
        let bits = self.bits();
        for shift in (0..9).rev() {
            let c = if bits & (1 << shift) != 0 {
                FLAGS[2 - shift % 3]
            } else {
                '-'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Attributes common to files and directories. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub owner: String,
    pub group: String,
    pub permission: Permission,
    pub mtime: i64,
    pub atime: i64,
}

impl Attributes {
    pub fn new(owner: &Identity, permission: Permission, now: i64) -> Self {
        Self {
            owner: owner.user.clone(),
            group: owner.group.clone(),
            permission,
            mtime: now,
            atime: now,
        }
    }
}

/// Lifecycle of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    /// Created; blocks are being written.
    UnderConstruction,
    /// All blocks written and checksummed.
    Complete,
    /// A transfer failed part way; the content must not be read.
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub length: u64,
    pub block_size: NonZeroU64,
    pub replication: NonZeroU16,
    pub blocks: Vec<BlockId>,
    pub state: FileState,
}

impl FileMeta {
    pub fn new(block_size: NonZeroU64, replication: NonZeroU16) -> Self {
        Self {
            length: 0,
            block_size,
            replication,
            blocks: Vec::new(),
            state: FileState::UnderConstruction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum INodeKind {
    /// Children keyed by name; `BTreeMap` keeps them in name order.
    Directory { children: BTreeMap<String, InodeId> },
    File(FileMeta),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct INode {
    pub id: InodeId,
    pub name: String,
    pub parent: Option<InodeId>,
    pub attrs: Attributes,
    pub kind: INodeKind,
}

impl INode {
    pub fn directory(id: InodeId, name: String, parent: Option<InodeId>, attrs: Attributes) -> Self {
        Self {
            id,
            name,
            parent,
            attrs,
            kind: INodeKind::Directory {
                children: BTreeMap::new(),
            },
        }
    }

    pub fn file(
        id: InodeId,
        name: String,
        parent: Option<InodeId>,
        attrs: Attributes,
        meta: FileMeta,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            attrs,
            kind: INodeKind::File(meta),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, INodeKind::Directory { .. })
    }

    pub fn children(&self) -> Option<&BTreeMap<String, InodeId>> {
        match &self.kind {
            INodeKind::Directory { children } => Some(children),
            INodeKind::File(_) => None,
        }
    }

    pub fn file_meta(&self) -> Option<&FileMeta> {
        match &self.kind {
            INodeKind::File(meta) => Some(meta),
            INodeKind::Directory { .. } => None,
        }
    }
}
