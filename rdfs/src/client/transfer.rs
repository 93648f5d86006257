//! 块级数据传输：按副本写入、带回退的读取与校验和计算。

use crate::block::{Block, BlockId, HostId};
use crate::datanode::DataNodeResolver;
use crate::error::{DfsError, Op, Result};
use crate::path::DfsPath;
use bytes::Bytes;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex SHA-256 of a block's bytes.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Outcome of `copy_from_local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReport {
    pub path: DfsPath,
    pub bytes: u64,
    pub blocks: usize,
    /// Non-fatal conditions, currently only `InsufficientReplicas`.
    pub warnings: Vec<DfsError>,
}

/// Outcome of `copy_to_local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReport {
    pub local: PathBuf,
    pub bytes: u64,
    pub blocks: usize,
}

/// Hidden sibling the download is staged in before the final rename.
pub(crate) fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.rdfs-part"))
}

/// Send one block to all of its replica hosts at once and return the hosts
/// that acknowledged it.
pub(crate) async fn write_replicas(
    resolver: &dyn DataNodeResolver,
    block: &Block,
    data: Bytes,
) -> (Vec<HostId>, Vec<(HostId, String)>) {
    let writes = block.replicas.iter().map(|host| {
        let data = data.clone();
        async move {
            let res = match resolver.resolve(host) {
                Some(store) => store.put_block(block.id, data).await.map_err(|e| e.to_string()),
                None => Err("host is not registered".to_string()),
            };
            (host.clone(), res)
        }
    });

    let mut acked = Vec::new();
    let mut failed = Vec::new();
    for (host, res) in join_all(writes).await {
        match res {
            Ok(()) => acked.push(host),
            Err(e) => {
                tracing::warn!(block = %block.id, %host, error = %e, "replica write failed");
                failed.push((host, e));
            }
        }
    }
    (acked, failed)
}

/// Best-effort removal of replicas that no file references any more.
pub(crate) async fn discard_replicas(resolver: &dyn DataNodeResolver, blocks: &[Block]) {
    for block in blocks {
        for host in &block.replicas {
            let Some(store) = resolver.resolve(host) else {
                continue;
            };
            if let Err(e) = store.delete_block(block.id).await {
                tracing::warn!(block = %block.id, %host, error = %e, "failed to discard replica");
            }
        }
    }
}

/// Read one block, trying replicas in order. A replica that errors, is
/// missing, has the wrong length or (with `verify`) fails its checksum is
/// skipped. If every replica fails and at least one failed verification the
/// error is `ChecksumMismatch`; a wrong length without `verify` only counts
/// as a transfer failure.
pub(crate) async fn read_block(
    resolver: &dyn DataNodeResolver,
    op: Op,
    path: &DfsPath,
    block: &Block,
    verify: bool,
) -> Result<Bytes> {
    let mut mismatched = false;
    let mut last_err = String::from("block has no replicas");
    for host in &block.replicas {
        let Some(store) = resolver.resolve(host) else {
            last_err = format!("{host} is not registered");
            continue;
        };
        let data = match store.get_block(block.id).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                last_err = format!("{host} has no replica of {}", block.id);
                continue;
            }
            Err(e) => {
                tracing::warn!(block = %block.id, %host, error = %e, "replica read failed");
                last_err = format!("{host}: {e}");
                continue;
            }
        };
        let bad_len = data.len() as u64 != block.length;
        let bad_sum = verify
            && block
                .checksum
                .as_deref()
                .is_some_and(|expected| checksum(&data) != expected);
        if bad_len || bad_sum {
            tracing::warn!(block = %block.id, %host, "replica failed verification, trying next");
            if verify {
                mismatched = true;
            } else {
                last_err = format!(
                    "{host} returned {} bytes for {}, expected {}",
                    data.len(),
                    block.id,
                    block.length
                );
            }
            continue;
        }
        return Ok(data);
    }
    if mismatched {
        Err(corrupt_block(op, path, block.id))
    } else {
        Err(DfsError::transfer(op, path, last_err))
    }
}

fn corrupt_block(op: Op, path: &DfsPath, block: BlockId) -> DfsError {
    DfsError::ChecksumMismatch {
        op,
        path: path.into(),
        block,
    }
}
