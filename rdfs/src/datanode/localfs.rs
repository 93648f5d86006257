//! 本地目录后端：每个副本对应一个 `blk_<id>` 文件。

use super::BlockStore;
use crate::block::BlockId;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

#[derive(Clone)]
pub struct LocalFsBlockStore {
    root: PathBuf,
}

impl LocalFsBlockStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: BlockId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

#[async_trait]
impl BlockStore for LocalFsBlockStore {
    #[tracing::instrument(level = "trace", skip_all, fields(block = %id, len = data.len()))]
    async fn put_block(&self, id: BlockId, data: Bytes) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root).await?;
        // 先写临时文件再 rename，读者不会看到写了一半的副本
        let tmp = self.root.join(format!("{id}.tmp"));
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(&data).await?;
        f.flush().await?;
        f.sync_all().await?;
        drop(f);
        fs::rename(&tmp, self.path_for(id)).await?;
        Ok(())
    }

    async fn get_block(&self, id: BlockId) -> anyhow::Result<Option<Bytes>> {
        match fs::read(self.path_for(id)).await {
            Ok(buf) => Ok(Some(Bytes::from(buf))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_block(&self, id: BlockId) -> anyhow::Result<()> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
