//! 元数据服务（authority）。
//!
//! `MetaServer` 用一把写锁串行化所有命名空间与块表变更。状态放在 `Arc` 中并
//! 写时复制，读者拿到的快照在持有期间保持不变。

use super::inode::{FileState, Identity};
use super::state::{Allocation, CommittedBlock, MetaSnapshot, MetaState};
use super::status::{FileHandle, FileStatus};
use crate::block::{Block, PlacementPolicy, RoundRobinPlacement};
use crate::client::protocol::{CreateRequest, NameService, ServerDefaults};
use crate::datanode::{DataNodeRegistry, DataNodeResolver};
use crate::error::{DfsError, Op, Result};
use crate::path::DfsPath;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct MetaServer {
    state: RwLock<Arc<MetaState>>,
    datanodes: Arc<DataNodeRegistry>,
    placement: Box<dyn PlacementPolicy>,
    defaults: ServerDefaults,
}

impl MetaServer {
    pub fn new(
        datanodes: Arc<DataNodeRegistry>,
        defaults: ServerDefaults,
        superuser: &Identity,
    ) -> Self {
        Self {
            state: RwLock::new(Arc::new(MetaState::new(superuser, now_millis()))),
            datanodes,
            placement: Box::new(RoundRobinPlacement::new()),
            defaults,
        }
    }

    pub fn with_placement(mut self, placement: Box<dyn PlacementPolicy>) -> Self {
        self.placement = placement;
        self
    }

    pub fn defaults(&self) -> ServerDefaults {
        self.defaults
    }

    pub fn datanodes(&self) -> &Arc<DataNodeRegistry> {
        &self.datanodes
    }

    fn read<T>(&self, f: impl FnOnce(&MetaState) -> Result<T>) -> Result<T> {
        let guard = self.state.read();
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut MetaState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        f(Arc::make_mut(&mut guard))
    }

    /// Delete replicas of blocks already dropped from the table. Failures
    /// only leave orphaned bytes behind, so they are logged and skipped.
    async fn reclaim(&self, blocks: Vec<Block>) {
        for block in blocks {
            for host in &block.replicas {
                let Some(store) = self.datanodes.resolve(host) else {
                    continue;
                };
                if let Err(e) = store.delete_block(block.id).await {
                    tracing::warn!(block = %block.id, %host, error = %e, "failed to reclaim replica");
                }
            }
        }
    }
}

#[async_trait]
impl NameService for MetaServer {
    async fn handshake(&self, identity: &Identity) -> Result<ServerDefaults> {
        tracing::debug!(user = %identity.user, "handshake");
        Ok(self.defaults)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    async fn mkdirs(&self, path: &DfsPath, owner: &Identity) -> Result<bool> {
        let created = self.write(|s| s.namespace.mkdirs(path, owner, now_millis()))?;
        if created {
            tracing::info!(%path, owner = %owner.user, "mkdirs");
        }
        Ok(created)
    }

    async fn stat(&self, path: &DfsPath) -> Result<FileStatus> {
        self.read(|s| s.namespace.stat(path))
    }

    async fn list_status(&self, path: &DfsPath) -> Result<Vec<FileStatus>> {
        self.read(|s| s.namespace.list(path))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(src = %src, dst = %dst, overwrite = overwrite))]
    async fn rename(&self, src: &DfsPath, dst: &DfsPath, overwrite: bool) -> Result<()> {
        let released = self.write(|s| {
            let ids = s.namespace.rename(src, dst, overwrite, now_millis())?;
            Ok(s.release(&ids))
        })?;
        tracing::info!(%src, %dst, released = released.len(), "rename");
        self.reclaim(released).await;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path, recursive = recursive))]
    async fn delete(&self, path: &DfsPath, recursive: bool) -> Result<()> {
        let released = self.write(|s| {
            let ids = s.namespace.delete(path, recursive, now_millis())?;
            Ok(s.release(&ids))
        })?;
        tracing::info!(%path, recursive, released = released.len(), "delete");
        self.reclaim(released).await;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %req.path))]
    async fn create_file(&self, req: CreateRequest) -> Result<FileHandle> {
        let (handle, released) = self.write(|s| {
            let (handle, ids) = s.namespace.create_file(
                &req.path,
                req.block_size,
                req.replication,
                req.overwrite,
                &req.owner,
                now_millis(),
            )?;
            Ok((handle, s.release(&ids)))
        })?;
        tracing::info!(
            path = %req.path,
            replication = req.replication.get(),
            block_size = req.block_size.get(),
            "create"
        );
        self.reclaim(released).await;
        Ok(handle)
    }

    async fn open(&self, path: &DfsPath) -> Result<FileHandle> {
        self.write(|s| {
            let handle = s.namespace.open(path)?;
            match s.namespace.file(Op::Open, &handle)?.state {
                FileState::Complete => {}
                FileState::UnderConstruction => {
                    return Err(DfsError::transfer(Op::Open, path, "file is still being written"));
                }
                FileState::Corrupt => {
                    return Err(DfsError::transfer(Op::Open, path, "file is marked corrupt"));
                }
            }
            s.namespace.touch_access(handle.ino, now_millis());
            Ok(handle)
        })
    }

    async fn allocate_blocks(&self, file: &FileHandle, length: u64) -> Result<Allocation> {
        let pool = self.datanodes.hosts();
        if pool.is_empty() {
            return Err(DfsError::transfer(
                Op::AllocateBlocks,
                &file.path,
                "no datanodes registered",
            ));
        }
        let alloc = self.write(|s| s.allocate_blocks(file, length, &pool, self.placement.as_ref()))?;
        if let Some(shortfall) = &alloc.shortfall {
            tracing::warn!(
                path = %file.path,
                requested = shortfall.requested,
                placed = shortfall.placed,
                "not enough datanodes for requested replication"
            );
        }
        tracing::debug!(path = %file.path, length, blocks = alloc.blocks.len(), "allocated");
        Ok(alloc)
    }

    async fn locate(&self, file: &FileHandle) -> Result<Vec<Block>> {
        self.read(|s| s.locate(file))
    }

    async fn complete(&self, file: &FileHandle, committed: Vec<CommittedBlock>) -> Result<()> {
        self.write(|s| s.complete(file, committed, now_millis()))?;
        tracing::debug!(path = %file.path, "complete");
        Ok(())
    }

    async fn mark_corrupt(&self, file: &FileHandle) -> Result<()> {
        self.write(|s| s.mark_corrupt(file))?;
        tracing::warn!(path = %file.path, "file marked corrupt");
        Ok(())
    }

    fn snapshot(&self) -> MetaSnapshot {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::HostId;
    use crate::datanode::{BlockStore, InMemoryBlockStore};
    use crate::error::ErrorKind;
    use bytes::Bytes;
    use std::num::{NonZeroU16, NonZeroU64};

    fn p(raw: &str) -> DfsPath {
        DfsPath::parse(raw).unwrap()
    }

    fn server(nodes: usize) -> (MetaServer, Vec<Arc<InMemoryBlockStore>>) {
        let registry = Arc::new(DataNodeRegistry::new());
        let mut stores = Vec::new();
        for i in 0..nodes {
            let store = Arc::new(InMemoryBlockStore::new());
            registry.register(HostId::new(format!("dn-{i}")), store.clone());
            stores.push(store);
        }
        let server = MetaServer::new(registry, ServerDefaults::default(), &Identity::new("hdfs"));
        (server, stores)
    }

    fn create_req(path: &str, overwrite: bool) -> CreateRequest {
        CreateRequest {
            path: p(path),
            block_size: NonZeroU64::new(4).unwrap(),
            replication: NonZeroU16::new(2).unwrap(),
            overwrite,
            owner: Identity::new("atguigu"),
        }
    }

    async fn write_file(server: &MetaServer, stores: &[Arc<InMemoryBlockStore>], path: &str) {
        let handle = server.create_file(create_req(path, true)).await.unwrap();
        let alloc = server.allocate_blocks(&handle, 6).await.unwrap();
        let mut committed = Vec::new();
        for block in &alloc.blocks {
            for host in &block.replicas {
                let idx: usize = host.as_str().trim_start_matches("dn-").parse().unwrap();
                stores[idx]
                    .put_block(block.id, Bytes::from(vec![1u8; block.length as usize]))
                    .await
                    .unwrap();
            }
            committed.push(CommittedBlock {
                id: block.id,
                checksum: "x".into(),
                replicas: block.replicas.clone(),
            });
        }
        server.complete(&handle, committed).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_is_not_disturbed_by_writes() {
        let (server, _) = server(1);
        server.mkdirs(&p("/a"), &Identity::new("atguigu")).await.unwrap();
        let before = server.snapshot();
        server.mkdirs(&p("/b"), &Identity::new("atguigu")).await.unwrap();
        assert!(before.namespace.lookup(&p("/b")).is_none());
        assert!(server.snapshot().namespace.lookup(&p("/b")).is_some());
    }

    #[tokio::test]
    async fn test_delete_reclaims_replicas() {
        let (server, stores) = server(2);
        write_file(&server, &stores, "/d/f").await;
        assert_eq!(stores[0].block_count() + stores[1].block_count(), 4);

        server.delete(&p("/d"), true).await.unwrap();
        assert_eq!(stores[0].block_count() + stores[1].block_count(), 0);
        assert!(server.snapshot().blocks.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_reclaims_old_blocks() {
        let (server, stores) = server(2);
        write_file(&server, &stores, "/f").await;
        write_file(&server, &stores, "/f").await;
        assert_eq!(stores[0].block_count() + stores[1].block_count(), 4);
        assert_eq!(server.snapshot().blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_open_requires_complete_file() {
        let (server, stores) = server(1);
        let handle = server.create_file(create_req("/u", false)).await.unwrap();
        let err = server.open(&p("/u")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);

        server.mark_corrupt(&handle).await.unwrap();
        let err = server.open(&p("/u")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);

        write_file(&server, &stores, "/ok").await;
        let handle = server.open(&p("/ok")).await.unwrap();
        assert_eq!(server.locate(&handle).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_allocate_without_datanodes_fails() {
        let (server, _) = server(0);
        let handle = server.create_file(create_req("/f", false)).await.unwrap();
        let err = server.allocate_blocks(&handle, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
    }
}
