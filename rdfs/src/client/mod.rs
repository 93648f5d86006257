//! Client session
//!
//! Responsibilities:
//! - Connect to a cluster and agree on effective replication and block size.
//! - Expose namespace operations with session-relative path resolution.
//! - Move file bytes between the local filesystem and replica hosts.
//!
//! Submodules:
//! - `config`: `ClientOptions` and their resolution
//! - `protocol`: the `NameService` / `Connector` seam
//! - `session`: `Session` state machine and operations
//! - `transfer`: per-block replica I/O and checksums
//! - `iter`: snapshot-pinned `listFiles` iterator
pub mod config;
pub mod iter;
pub mod protocol;
pub mod session;
pub mod transfer;

pub use config::{ClientOptions, EffectiveConfig};
pub use iter::LocatedFileIter;
pub use protocol::{ClusterEndpoint, Connection, Connector, NameService, ServerDefaults};
pub use session::{Session, SessionState};
pub use transfer::{GetReport, PutReport};
