//! Error taxonomy shared by the authority, the data path and client sessions.
//!
//! Every variant carries the operation that failed and, when one exists, the
//! offending path. Sessions re-tag errors coming back from the authority with
//! their own operation name via [`DfsError::in_op`].

use crate::block::BlockId;
use crate::path::DfsPath;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Optional path rendered as `": <path>"` after the error text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHint(Option<String>);

impl PathHint {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn some(path: impl Into<String>) -> Self {
        Self(Some(path.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for PathHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(path) if !path.is_empty() => write!(f, ": {path}"),
            _ => Ok(()),
        }
    }
}

impl From<String> for PathHint {
    fn from(value: String) -> Self {
        Self::some(value)
    }
}

impl From<&str> for PathHint {
    fn from(value: &str) -> Self {
        Self::some(value)
    }
}

impl From<&DfsPath> for PathHint {
    fn from(value: &DfsPath) -> Self {
        Self::some(value.to_string())
    }
}

impl From<&Path> for PathHint {
    fn from(value: &Path) -> Self {
        Self::some(value.display().to_string())
    }
}

/// Operation names reported with every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Parse,
    Connect,
    Mkdirs,
    Stat,
    ListStatus,
    ListFiles,
    Rename,
    Delete,
    CreateFile,
    Open,
    AllocateBlocks,
    Locate,
    Complete,
    MarkCorrupt,
    CopyFromLocal,
    CopyToLocal,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Parse => "parse",
            Op::Connect => "connect",
            Op::Mkdirs => "mkdirs",
            Op::Stat => "stat",
            Op::ListStatus => "listStatus",
            Op::ListFiles => "listFiles",
            Op::Rename => "rename",
            Op::Delete => "delete",
            Op::CreateFile => "createFile",
            Op::Open => "open",
            Op::AllocateBlocks => "allocateBlocks",
            Op::Locate => "locate",
            Op::Complete => "complete",
            Op::MarkCorrupt => "markCorrupt",
            Op::CopyFromLocal => "copyFromLocal",
            Op::CopyToLocal => "copyToLocal",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copyable discriminant of [`DfsError`], handy for assertions and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    AlreadyExists,
    NotADirectory,
    DirectoryNotEmpty,
    SessionClosed,
    Transfer,
    ChecksumMismatch,
    InsufficientReplicas,
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DfsError {
    #[error("{op}: invalid path{path}: {reason}")]
    InvalidPath {
        op: Op,
        path: PathHint,
        reason: String,
    },

    #[error("{op}: not found{path}")]
    NotFound { op: Op, path: PathHint },

    #[error("{op}: already exists{path}")]
    AlreadyExists { op: Op, path: PathHint },

    #[error("{op}: not a directory{path}")]
    NotADirectory { op: Op, path: PathHint },

    #[error("{op}: directory not empty{path}")]
    DirectoryNotEmpty { op: Op, path: PathHint },

    #[error("{op}: session closed{path}")]
    SessionClosed { op: Op, path: PathHint },

    #[error("{op}: transfer failed{path}: {reason}")]
    Transfer {
        op: Op,
        path: PathHint,
        reason: String,
    },

    #[error("{op}: checksum mismatch{path} (block {block})")]
    ChecksumMismatch {
        op: Op,
        path: PathHint,
        block: BlockId,
    },

    /// Warning only: the data was stored with fewer replicas than requested.
    #[error("{op}: insufficient replicas{path}: requested {requested}, placed {placed}")]
    InsufficientReplicas {
        op: Op,
        path: PathHint,
        requested: usize,
        placed: usize,
    },

    #[error("{op}: timed out{path} after {after:?}")]
    Timeout {
        op: Op,
        path: PathHint,
        after: Duration,
    },
}

pub type Result<T, E = DfsError> = std::result::Result<T, E>;

impl DfsError {
    pub fn invalid_path(op: Op, path: impl Into<PathHint>, reason: impl Into<String>) -> Self {
        DfsError::InvalidPath {
            op,
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(op: Op, path: impl Into<PathHint>) -> Self {
        DfsError::NotFound {
            op,
            path: path.into(),
        }
    }

    pub fn already_exists(op: Op, path: impl Into<PathHint>) -> Self {
        DfsError::AlreadyExists {
            op,
            path: path.into(),
        }
    }

    pub fn not_a_directory(op: Op, path: impl Into<PathHint>) -> Self {
        DfsError::NotADirectory {
            op,
            path: path.into(),
        }
    }

    pub fn directory_not_empty(op: Op, path: impl Into<PathHint>) -> Self {
        DfsError::DirectoryNotEmpty {
            op,
            path: path.into(),
        }
    }

    pub fn session_closed(op: Op, path: impl Into<PathHint>) -> Self {
        DfsError::SessionClosed {
            op,
            path: path.into(),
        }
    }

    pub fn transfer(op: Op, path: impl Into<PathHint>, reason: impl fmt::Display) -> Self {
        DfsError::Transfer {
            op,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DfsError::InvalidPath { .. } => ErrorKind::InvalidPath,
            DfsError::NotFound { .. } => ErrorKind::NotFound,
            DfsError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            DfsError::NotADirectory { .. } => ErrorKind::NotADirectory,
            DfsError::DirectoryNotEmpty { .. } => ErrorKind::DirectoryNotEmpty,
            DfsError::SessionClosed { .. } => ErrorKind::SessionClosed,
            DfsError::Transfer { .. } => ErrorKind::Transfer,
            DfsError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            DfsError::InsufficientReplicas { .. } => ErrorKind::InsufficientReplicas,
            DfsError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Non-fatal conditions that are reported alongside a successful result.
    pub fn is_warning(&self) -> bool {
        matches!(self, DfsError::InsufficientReplicas { .. })
    }

    pub fn op(&self) -> Op {
        match self {
            DfsError::InvalidPath { op, .. }
            | DfsError::NotFound { op, .. }
            | DfsError::AlreadyExists { op, .. }
            | DfsError::NotADirectory { op, .. }
            | DfsError::DirectoryNotEmpty { op, .. }
            | DfsError::SessionClosed { op, .. }
            | DfsError::Transfer { op, .. }
            | DfsError::ChecksumMismatch { op, .. }
            | DfsError::InsufficientReplicas { op, .. }
            | DfsError::Timeout { op, .. } => *op,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.hint().as_str()
    }

    fn hint(&self) -> &PathHint {
        match self {
            DfsError::InvalidPath { path, .. }
            | DfsError::NotFound { path, .. }
            | DfsError::AlreadyExists { path, .. }
            | DfsError::NotADirectory { path, .. }
            | DfsError::DirectoryNotEmpty { path, .. }
            | DfsError::SessionClosed { path, .. }
            | DfsError::Transfer { path, .. }
            | DfsError::ChecksumMismatch { path, .. }
            | DfsError::InsufficientReplicas { path, .. }
            | DfsError::Timeout { path, .. } => path,
        }
    }

    /// Re-tag the error with the operation the caller actually issued.
    pub fn in_op(mut self, new_op: Op) -> Self {
        match &mut self {
            DfsError::InvalidPath { op, .. }
            | DfsError::NotFound { op, .. }
            | DfsError::AlreadyExists { op, .. }
            | DfsError::NotADirectory { op, .. }
            | DfsError::DirectoryNotEmpty { op, .. }
            | DfsError::SessionClosed { op, .. }
            | DfsError::Transfer { op, .. }
            | DfsError::ChecksumMismatch { op, .. }
            | DfsError::InsufficientReplicas { op, .. }
            | DfsError::Timeout { op, .. } => *op = new_op,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_op_and_path() {
        let err = DfsError::not_found(Op::Stat, "/a/b");
        assert_eq!(err.to_string(), "stat: not found: /a/b");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some("/a/b"));

        let closed = DfsError::session_closed(Op::Connect, PathHint::none());
        assert_eq!(closed.to_string(), "connect: session closed");
        assert_eq!(closed.path(), None);

        let closed = DfsError::session_closed(Op::Mkdirs, "/a");
        assert_eq!(closed.to_string(), "mkdirs: session closed: /a");
    }

    #[test]
    fn test_in_op_retags_without_touching_path() {
        let err = DfsError::directory_not_empty(Op::Delete, "/x").in_op(Op::CopyToLocal);
        assert_eq!(err.op(), Op::CopyToLocal);
        assert_eq!(err.path(), Some("/x"));
        assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);
    }

    #[test]
    fn test_only_replica_shortfall_is_a_warning() {
        let warn = DfsError::InsufficientReplicas {
            op: Op::AllocateBlocks,
            path: PathHint::some("/f"),
            requested: 3,
            placed: 1,
        };
        assert!(warn.is_warning());
        assert!(!DfsError::transfer(Op::CopyFromLocal, "/f", "boom").is_warning());
    }
}
