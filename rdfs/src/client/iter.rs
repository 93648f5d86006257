//! 基于快照的惰性文件遍历器（listFiles）。

use crate::error::{Op, Result};
use crate::meta::{InodeId, LocatedFileStatus, MetaSnapshot};
use crate::path::DfsPath;

/// Yields the files under a root in depth-first, name order.
///
/// The walk reads from the metadata snapshot taken when it was created, so
/// it never observes later mutations.
pub struct LocatedFileIter {
    snapshot: MetaSnapshot,
    stack: Vec<(DfsPath, InodeId, usize)>,
    recursive: bool,
}

impl LocatedFileIter {
    pub(crate) fn new(snapshot: MetaSnapshot, root: DfsPath, recursive: bool) -> Result<Self> {
        let id = snapshot.namespace.resolve(Op::ListFiles, &root)?;
        Ok(Self {
            snapshot,
            stack: vec![(root, id, 0)],
            recursive,
        })
    }
}

impl Iterator for LocatedFileIter {
    type Item = LocatedFileStatus;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, id, depth)) = self.stack.pop() {
            let Some(node) = self.snapshot.namespace.get(id) else {
                continue;
            };
            match node.children() {
                None => return self.snapshot.located_status(path, id),
                Some(children) => {
                    if depth > 0 && !self.recursive {
                        continue;
                    }
                    // 逆序压栈，保证最小的名字先弹出
                    for (name, &child) in children.iter().rev() {
                        self.stack.push((path.with_segment(name), child, depth + 1));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::meta::{Identity, MetaState};
    use std::num::{NonZeroU16, NonZeroU64};
    use std::sync::Arc;

    fn p(raw: &str) -> DfsPath {
        DfsPath::parse(raw).unwrap()
    }

    fn state() -> MetaState {
        let me = Identity::new("atguigu");
        let mut s = MetaState::new(&me, 0);
        for dir in ["/x/b", "/x/a/deep"] {
            s.namespace.mkdirs(&p(dir), &me, 0).unwrap();
        }
        for file in ["/x/z.txt", "/x/a/deep/1.txt", "/x/a/0.txt", "/x/b/2.txt"] {
            s.namespace
                .create_file(
                    &p(file),
                    NonZeroU64::new(64).unwrap(),
                    NonZeroU16::new(1).unwrap(),
                    false,
                    &me,
                    0,
                )
                .unwrap();
        }
        s
    }

    fn names(iter: LocatedFileIter) -> Vec<String> {
        iter.map(|f| f.status.path.to_string()).collect()
    }

    #[test]
    fn test_recursive_walk_is_depth_first_in_name_order() {
        let snap = Arc::new(state());
        let iter = LocatedFileIter::new(snap, p("/x"), true).unwrap();
        assert_eq!(
            names(iter),
            vec!["/x/a/0.txt", "/x/a/deep/1.txt", "/x/b/2.txt", "/x/z.txt"]
        );
    }

    #[test]
    fn test_non_recursive_lists_direct_files_only() {
        let snap = Arc::new(state());
        let iter = LocatedFileIter::new(snap, p("/x"), false).unwrap();
        assert_eq!(names(iter), vec!["/x/z.txt"]);
    }

    #[test]
    fn test_file_root_and_missing_root() {
        let snap = Arc::new(state());
        let iter = LocatedFileIter::new(snap.clone(), p("/x/b/2.txt"), true).unwrap();
        assert_eq!(names(iter), vec!["/x/b/2.txt"]);

        let err = LocatedFileIter::new(snap, p("/nope"), true).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.op(), Op::ListFiles);
    }
}
