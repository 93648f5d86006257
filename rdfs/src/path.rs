//! 层级路径模型。
//!
//! [`DfsPath`] 由若干非空段和一个绝对路径标记组成；规范化后的字符串除根目录
//! 外不以 `/` 结尾。

use crate::error::{DfsError, Op, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DfsPath {
    absolute: bool,
    segments: Vec<String>,
}

impl DfsPath {
    /// The root directory `/`.
    pub fn root() -> Self {
        Self {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// Parse an absolute or relative path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(DfsError::invalid_path(Op::Parse, raw, "empty path"));
        }
        let absolute = raw.starts_with(SEPARATOR);
        let body = raw.strip_prefix(SEPARATOR).unwrap_or(raw);
        if body.is_empty() {
            return Ok(Self::root());
        }
        // 允许并丢弃一个结尾分隔符
        let body = body.strip_suffix(SEPARATOR).unwrap_or(body);

        let mut segments = Vec::new();
        for seg in body.split(SEPARATOR) {
            validate_segment(raw, seg)?;
            segments.push(seg.to_string());
        }
        Ok(Self { absolute, segments })
    }

    /// Parse a path that must be absolute.
    pub fn parse_absolute(raw: &str) -> Result<Self> {
        let path = Self::parse(raw)?;
        if !path.absolute {
            return Err(DfsError::invalid_path(
                Op::Parse,
                raw,
                "relative path without a base",
            ));
        }
        Ok(path)
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Append `child` to `base`. An absolute `child` stands on its own.
    pub fn join(&self, child: &DfsPath) -> DfsPath {
        if child.absolute {
            return child.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        DfsPath {
            absolute: self.absolute,
            segments,
        }
    }

    /// Append one already-validated segment.
    pub fn child(&self, name: &str) -> Result<DfsPath> {
        validate_segment(name, name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(DfsPath {
            absolute: self.absolute,
            segments,
        })
    }

    /// Append a segment that is known to be valid (e.g. a name read back from
    /// the namespace).
    pub(crate) fn with_segment(&self, name: &str) -> DfsPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        DfsPath {
            absolute: self.absolute,
            segments,
        }
    }

    pub fn parent(&self) -> Result<DfsPath> {
        if self.segments.is_empty() || (!self.absolute && self.segments.len() == 1) {
            return Err(DfsError::invalid_path(
                Op::Parse,
                self,
                "path has no parent",
            ));
        }
        Ok(DfsPath {
            absolute: self.absolute,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Anchor a relative path at `base`; absolute paths are returned as-is.
    pub fn resolve(&self, base: &DfsPath) -> DfsPath {
        if self.absolute {
            self.clone()
        } else {
            base.join(self)
        }
    }

    /// True when `other` lies strictly beneath `self`.
    pub fn is_ancestor_of(&self, other: &DfsPath) -> bool {
        self.absolute == other.absolute
            && self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }
}

fn validate_segment(raw: &str, seg: &str) -> Result<()> {
    if seg.is_empty() {
        return Err(DfsError::invalid_path(Op::Parse, raw, "empty segment"));
    }
    if seg == "." || seg == ".." {
        return Err(DfsError::invalid_path(
            Op::Parse,
            raw,
            format!("segment `{seg}` is not allowed"),
        ));
    }
    if let Some(c) = seg.chars().find(|&c| matches!(c, '\0' | ':' | SEPARATOR)) {
        return Err(DfsError::invalid_path(
            Op::Parse,
            raw,
            format!("illegal character {c:?}"),
        ));
    }
    Ok(())
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for DfsPath {
    type Err = DfsError;

    fn from_str(s: &str) -> Result<Self> {
        DfsPath::parse(s)
    }
}

impl TryFrom<String> for DfsPath {
    type Error = DfsError;

    fn try_from(value: String) -> Result<Self> {
        DfsPath::parse(&value)
    }
}

impl From<DfsPath> for String {
    fn from(value: DfsPath) -> Self {
        value.to_string()
    }
}
