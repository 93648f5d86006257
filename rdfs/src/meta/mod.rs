//! Metadata store and authority
//!
//! Responsibilities:
//! - Keep the hierarchical namespace (`namespace`) and its INode records
//!   (`inode`).
//! - Pair the namespace with the block table into one versioned unit
//!   (`state`) so readers can pin a consistent snapshot.
//! - Serialize mutations from all sessions through one owner (`server`).
//!
//! Submodules:
//! - `inode`: INode, attributes, file lifecycle
//! - `namespace`: tree operations (mkdir/rename/delete/create/open)
//! - `state`: namespace + block table, allocate/complete/mark corrupt
//! - `status`: caller-facing status and block-location views
//! - `server`: the `MetaServer` authority behind the `NameService` seam
pub mod inode;
pub mod namespace;
pub mod server;
pub mod state;
pub mod status;

pub use inode::{FileState, INode, INodeKind, Identity, InodeId, Permission};
pub use namespace::Namespace;
pub use server::MetaServer;
pub use state::{Allocation, CommittedBlock, MetaSnapshot, MetaState};
pub use status::{BlockLocation, FileHandle, FileKind, FileStatus, LocatedFileStatus};
