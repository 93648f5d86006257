//! 内存块存储：用于本地开发与测试，可模拟离线与损坏。

use super::BlockStore;
use crate::block::BlockId;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct InMemoryBlockStore {
    map: Mutex<HashMap<BlockId, Bytes>>,
    offline: AtomicBool,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a host outage: every call fails until brought back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Flip the first byte of a stored replica. Returns false if absent.
    pub fn corrupt_block(&self, id: BlockId) -> bool {
        let mut map = self.map.lock();
        match map.get_mut(&id) {
            Some(data) if !data.is_empty() => {
                let mut buf = BytesMut::from(&data[..]);
                buf[0] ^= 0xff;
                *data = buf.freeze();
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.map.lock().contains_key(&id)
    }

    pub fn block_count(&self) -> usize {
        self.map.lock().len()
    }

    fn check_online(&self) -> anyhow::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("datanode is offline");
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn put_block(&self, id: BlockId, data: Bytes) -> anyhow::Result<()> {
        self.check_online()?;
        self.map.lock().insert(id, data);
        Ok(())
    }

    async fn get_block(&self, id: BlockId) -> anyhow::Result<Option<Bytes>> {
        self.check_online()?;
        Ok(self.map.lock().get(&id).cloned())
    }

    async fn delete_block(&self, id: BlockId) -> anyhow::Result<()> {
        self.check_online()?;
        self.map.lock().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryBlockStore::new();
        store.put_block(BlockId(7), Bytes::from_static(b"hello")).await.unwrap();
        assert!(store.contains(BlockId(7)));
        assert_eq!(
            store.get_block(BlockId(7)).await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );
        store.delete_block(BlockId(7)).await.unwrap();
        assert_eq!(store.get_block(BlockId(7)).await.unwrap(), None);
        store.delete_block(BlockId(7)).await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_and_corrupt() {
        let store = InMemoryBlockStore::new();
        store.put_block(BlockId(1), Bytes::from_static(b"abc")).await.unwrap();
        assert!(store.corrupt_block(BlockId(1)));
        assert!(!store.corrupt_block(BlockId(2)));
        let data = store.get_block(BlockId(1)).await.unwrap().unwrap();
        assert_ne!(&data[..], b"abc");

        store.set_offline(true);
        assert!(store.get_block(BlockId(1)).await.is_err());
        store.set_offline(false);
        assert!(store.get_block(BlockId(1)).await.is_ok());
    }
}
