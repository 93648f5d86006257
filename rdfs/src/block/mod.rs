//! Block location index
//!
//! Responsibilities:
//! - Split a file length into fixed-size blocks (the last one may be shorter).
//! - Choose replica hosts for every block through a pluggable placement policy.
//! - Keep the block table (id -> length, replicas, checksum) that the
//!   metadata authority consults to locate file content.
//!
//! Submodules:
//! - `layout`: block splitting helpers
//! - `placement`: placement policies
//! - `index`: the block table itself
pub mod index;
pub mod layout;
pub mod placement;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use index::BlockIndex;
pub use layout::{BlockSpan, split_into_blocks};
pub use placement::{PlacementPolicy, ReplicaShortfall, RoundRobinPlacement};

/// Block identifier, unique for the lifetime of an authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk_{}", self.0)
    }
}

/// Replica host identifier (a data node name such as `dn-0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(String);

impl HostId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk of file content and the hosts holding its replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub length: u64,
    pub replicas: Vec<HostId>,
    /// Hex SHA-256 of the block bytes, recorded when the file is finalized.
    pub checksum: Option<String>,
}
