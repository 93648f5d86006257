//! Replica hosts (data nodes)
//!
//! Responsibilities:
//! - Store and serve block bytes by block id.
//! - Let the authority reclaim replicas of deleted blocks.
//! - Map host ids to their stores so writers and readers can reach them.
//!
//! Submodules:
//! - `memory`: in-memory store used by tests and the in-process cluster
//! - `localfs`: one file per block under a local directory
pub mod localfs;
pub mod memory;

use crate::block::{BlockId, HostId};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use localfs::LocalFsBlockStore;
pub use memory::InMemoryBlockStore;

/// Block-level storage interface exposed by one replica host.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn put_block(&self, id: BlockId, data: Bytes) -> anyhow::Result<()>;

    /// `Ok(None)` when the host has no replica of `id`.
    async fn get_block(&self, id: BlockId) -> anyhow::Result<Option<Bytes>>;

    /// Removing an absent block is not an error.
    async fn delete_block(&self, id: BlockId) -> anyhow::Result<()>;
}

/// Resolves a replica host to the store holding its blocks.
pub trait DataNodeResolver: Send + Sync {
    fn resolve(&self, host: &HostId) -> Option<Arc<dyn BlockStore>>;
}

/// Registered replica hosts, iterated in host-id order.
#[derive(Default)]
pub struct DataNodeRegistry {
    nodes: RwLock<BTreeMap<HostId, Arc<dyn BlockStore>>>,
}

impl DataNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, host: HostId, store: Arc<dyn BlockStore>) {
        tracing::info!(%host, "datanode registered");
        self.nodes.write().insert(host, store);
    }

    pub fn deregister(&self, host: &HostId) -> bool {
        let removed = self.nodes.write().remove(host).is_some();
        if removed {
            tracing::info!(%host, "datanode deregistered");
        }
        removed
    }

    /// The host pool offered to the placement policy.
    pub fn hosts(&self) -> Vec<HostId> {
        self.nodes.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl DataNodeResolver for DataNodeRegistry {
    fn resolve(&self, host: &HostId) -> Option<Arc<dyn BlockStore>> {
        self.nodes.read().get(host).cloned()
    }
}
