//! rdfs: a minimal distributed filesystem core.
//!
//! A [`meta::MetaServer`] owns the namespace and the block table, data nodes
//! ([`datanode::BlockStore`]) hold block bytes, and a [`client::Session`]
//! connects to the authority to create, move, list, upload and download.
//! [`cluster::MiniCluster`] wires all of it together in one process.
pub mod block;
pub mod client;
pub mod cluster;
pub mod datanode;
pub mod error;
pub mod meta;
pub mod path;

pub use client::{ClientOptions, Session};
pub use cluster::MiniCluster;
pub use error::{DfsError, ErrorKind, Result};
pub use path::DfsPath;
