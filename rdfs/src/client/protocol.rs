//! 会话与元数据服务之间的请求/响应接口。
//!
//! 会话只依赖 [`NameService`] 与 [`DataNodeResolver`]，二者如何获得由
//! [`Connector`] 决定。

use crate::block::Block;
use crate::datanode::DataNodeResolver;
use crate::error::{DfsError, Op, Result};
use crate::meta::{
    Allocation, CommittedBlock, FileHandle, FileStatus, Identity, MetaSnapshot,
};
use crate::path::DfsPath;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::{NonZeroU16, NonZeroU64};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_REPLICATION: u16 = 3;
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

/// Values the authority advertises in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefaults {
    pub replication: NonZeroU16,
    pub block_size: NonZeroU64,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            replication: NonZeroU16::new(DEFAULT_REPLICATION).unwrap_or(NonZeroU16::MIN),
            block_size: NonZeroU64::new(DEFAULT_BLOCK_SIZE).unwrap_or(NonZeroU64::MIN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub path: DfsPath,
    pub block_size: NonZeroU64,
    pub replication: NonZeroU16,
    pub overwrite: bool,
    pub owner: Identity,
}

/// Operations served by the metadata authority. All paths are absolute.
#[async_trait]
pub trait NameService: Send + Sync {
    async fn handshake(&self, identity: &Identity) -> Result<ServerDefaults>;

    /// Returns whether anything was created.
    async fn mkdirs(&self, path: &DfsPath, owner: &Identity) -> Result<bool>;

    async fn stat(&self, path: &DfsPath) -> Result<FileStatus>;

    async fn list_status(&self, path: &DfsPath) -> Result<Vec<FileStatus>>;

    async fn rename(&self, src: &DfsPath, dst: &DfsPath, overwrite: bool) -> Result<()>;

    async fn delete(&self, path: &DfsPath, recursive: bool) -> Result<()>;

    async fn create_file(&self, req: CreateRequest) -> Result<FileHandle>;

    /// Open a complete file for reading.
    async fn open(&self, path: &DfsPath) -> Result<FileHandle>;

    async fn allocate_blocks(&self, file: &FileHandle, length: u64) -> Result<Allocation>;

    async fn locate(&self, file: &FileHandle) -> Result<Vec<Block>>;

    async fn complete(&self, file: &FileHandle, committed: Vec<CommittedBlock>) -> Result<()>;

    async fn mark_corrupt(&self, file: &FileHandle) -> Result<()>;

    /// Immutable view of the whole metadata state at this instant.
    fn snapshot(&self) -> MetaSnapshot;
}

/// An established link to a cluster.
#[derive(Clone)]
pub struct Connection {
    pub name_service: Arc<dyn NameService>,
    pub datanodes: Arc<dyn DataNodeResolver>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &ClusterEndpoint) -> Result<Connection>;
}

/// `host:port` of the metadata authority; a leading `scheme://` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterEndpoint {
    pub host: String,
    pub port: u16,
}

impl ClusterEndpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let bad = |reason: &str| DfsError::invalid_path(Op::Connect, raw, reason);
        let rest = match raw.split_once("://") {
            Some((_, rest)) => rest,
            None => raw,
        };
        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| bad("expected host:port"))?;
        if host.is_empty() {
            return Err(bad("empty host"));
        }
        let port = port.parse::<u16>().map_err(|_| bad("invalid port"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ClusterEndpoint {
    type Err = DfsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_endpoint_parse() {
        let ep = ClusterEndpoint::parse("hdfs://hadoop102:8020").unwrap();
        assert_eq!(ep.host, "hadoop102");
        assert_eq!(ep.port, 8020);
        assert_eq!(ep.to_string(), "hadoop102:8020");
        assert_eq!("hadoop102:8020".parse::<ClusterEndpoint>().unwrap(), ep);

        for raw in ["hadoop102", ":8020", "host:99999", "host:abc"] {
            let err = ClusterEndpoint::parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath, "{raw}");
            assert_eq!(err.op(), Op::Connect);
        }
    }

    #[test]
    fn test_server_defaults() {
        let d = ServerDefaults::default();
        assert_eq!(d.replication.get(), 3);
        assert_eq!(d.block_size.get(), 128 * 1024 * 1024);
    }
}
