//! 客户端选项，以及与服务端默认值合并后的生效配置。

use super::protocol::ServerDefaults;
use serde::{Deserialize, Serialize};
use std::num::{NonZeroU16, NonZeroU64};
use std::time::Duration;

/// Options a caller passes to `connect`. Unset fields fall back to what the
/// authority advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub replication: Option<NonZeroU16>,
    pub block_size: Option<NonZeroU64>,
    /// Deadline applied to each session call as a whole.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replication(mut self, replication: NonZeroU16) -> Self {
        self.replication = Some(replication);
        self
    }

    pub fn block_size(mut self, block_size: NonZeroU64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resolve(&self, defaults: &ServerDefaults) -> EffectiveConfig {
        EffectiveConfig {
            replication: self.replication.unwrap_or(defaults.replication),
            block_size: self.block_size.unwrap_or(defaults.block_size),
            timeout: self.timeout,
        }
    }
}

/// Settings in force for a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub replication: NonZeroU16,
    pub block_size: NonZeroU64,
    pub timeout: Option<Duration>,
}
