//! 进程内集群：一个元数据服务 + N 个数据节点，通过 endpoint 对外提供连接。

use crate::block::HostId;
use crate::client::protocol::{ClusterEndpoint, Connection, Connector, ServerDefaults};
use crate::client::{ClientOptions, Session};
use crate::datanode::{DataNodeRegistry, InMemoryBlockStore, LocalFsBlockStore};
use crate::error::{DfsError, Op, Result};
use crate::meta::{Identity, MetaServer};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::num::{NonZeroU16, NonZeroU64};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_ENDPOINT: &str = "hadoop102:8020";

#[derive(Debug, Clone)]
pub enum Storage {
    Memory,
    /// One subdirectory per data node under this root.
    LocalDir(PathBuf),
}

pub struct MiniClusterBuilder {
    endpoint: String,
    datanodes: usize,
    storage: Storage,
    defaults: ServerDefaults,
    superuser: Identity,
}

impl Default for MiniClusterBuilder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            datanodes: 3,
            storage: Storage::Memory,
            defaults: ServerDefaults::default(),
            superuser: Identity::new("hdfs"),
        }
    }
}

impl MiniClusterBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn datanodes(mut self, n: usize) -> Self {
        self.datanodes = n;
        self
    }

    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn replication(mut self, replication: NonZeroU16) -> Self {
        self.defaults.replication = replication;
        self
    }

    pub fn block_size(mut self, block_size: NonZeroU64) -> Self {
        self.defaults.block_size = block_size;
        self
    }

    pub fn superuser(mut self, user: impl Into<String>) -> Self {
        self.superuser = Identity::new(user);
        self
    }

    pub fn build(self) -> Result<MiniCluster> {
        let endpoint = ClusterEndpoint::parse(&self.endpoint)?;
        let registry = Arc::new(DataNodeRegistry::new());
        let mut memory = BTreeMap::new();
        for i in 0..self.datanodes {
            let host = HostId::new(format!("dn-{i}"));
            match &self.storage {
                Storage::Memory => {
                    let store = Arc::new(InMemoryBlockStore::new());
                    memory.insert(host.clone(), store.clone());
                    registry.register(host, store);
                }
                Storage::LocalDir(root) => {
                    let store = LocalFsBlockStore::new(root.join(host.as_str()));
                    registry.register(host, Arc::new(store));
                }
            }
        }
        let server = MetaServer::new(registry.clone(), self.defaults, &self.superuser);
        tracing::info!(
            %endpoint,
            datanodes = self.datanodes,
            replication = self.defaults.replication.get(),
            block_size = self.defaults.block_size.get(),
            "mini cluster started"
        );
        Ok(MiniCluster {
            endpoint,
            server: Arc::new(server),
            registry,
            memory,
        })
    }
}

pub struct MiniCluster {
    endpoint: ClusterEndpoint,
    server: Arc<MetaServer>,
    registry: Arc<DataNodeRegistry>,
    memory: BTreeMap<HostId, Arc<InMemoryBlockStore>>,
}

impl MiniCluster {
    pub fn builder() -> MiniClusterBuilder {
        MiniClusterBuilder::default()
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }

    pub fn server(&self) -> &Arc<MetaServer> {
        &self.server
    }

    pub fn registry(&self) -> &Arc<DataNodeRegistry> {
        &self.registry
    }

    /// The in-memory store of `host`, if the cluster keeps blocks in memory.
    pub fn memory_node(&self, host: &str) -> Option<Arc<InMemoryBlockStore>> {
        self.memory.get(&HostId::new(host)).cloned()
    }

    /// Connect a new session as `user`.
    pub async fn session(&self, user: &str, options: ClientOptions) -> Result<Session> {
        let mut session = Session::new(self.endpoint.clone(), Identity::new(user), options);
        session.connect(self).await?;
        Ok(session)
    }
}

#[async_trait]
impl Connector for MiniCluster {
    async fn connect(&self, endpoint: &ClusterEndpoint) -> Result<Connection> {
        if endpoint != &self.endpoint {
            return Err(DfsError::not_found(Op::Connect, endpoint.to_string()));
        }
        Ok(Connection {
            name_service: self.server.clone(),
            datanodes: self.registry.clone(),
        })
    }
}
