//! 内存命名空间树。
//!
//! 以 id 为键的 [`INode`] 池，目录按名字持有子项。所有变更方法先完整校验
//! 请求再修改，失败的调用不会改动树；并发调用的串行化由元数据服务负责。

use super::inode::{
    Attributes, FileMeta, INode, INodeKind, Identity, InodeId, Permission,
};
use super::status::{FileHandle, FileStatus};
use crate::block::BlockId;
use crate::error::{DfsError, Op, Result};
use crate::path::DfsPath;
use std::collections::HashMap;
use std::num::{NonZeroU16, NonZeroU64};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    inodes: HashMap<InodeId, INode>,
    root: InodeId,
    next_ino: u64,
}

fn require_absolute(op: Op, path: &DfsPath) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(DfsError::invalid_path(op, path, "path must be absolute"))
    }
}

impl Namespace {
    pub fn new(superuser: &Identity, now: i64) -> Self {
        let root = InodeId(1);
        let mut inodes = HashMap::new();
        inodes.insert(
            root,
            INode::directory(
                root,
                String::new(),
                None,
                Attributes::new(superuser, Permission::DIR_DEFAULT, now),
            ),
        );
        Self {
            inodes,
            root,
            next_ino: root.0 + 1,
        }
    }

    pub fn root(&self) -> InodeId {
        self.root
    }

    pub fn get(&self, id: InodeId) -> Option<&INode> {
        self.inodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    // 树中可达的 id 在 arena 中一定存在。
    fn node(&self, id: InodeId) -> &INode {
        &self.inodes[&id]
    }

    fn alloc_ino(&mut self) -> InodeId {
        let id = InodeId(self.next_ino);
        self.next_ino += 1;
        id
    }

    fn link(&mut self, parent: InodeId, name: &str, child: InodeId, now: i64) {
        if let Some(INode {
            attrs,
            kind: INodeKind::Directory { children },
            ..
        }) = self.inodes.get_mut(&parent)
        {
            children.insert(name.to_string(), child);
            attrs.mtime = now;
        }
    }

    fn unlink(&mut self, parent: InodeId, name: &str, now: i64) -> Option<InodeId> {
        match self.inodes.get_mut(&parent) {
            Some(INode {
                attrs,
                kind: INodeKind::Directory { children },
                ..
            }) => {
                attrs.mtime = now;
                children.remove(name)
            }
            _ => None,
        }
    }

    /// Drop `id` and everything beneath it; returns the blocks they owned.
    fn remove_subtree(&mut self, id: InodeId) -> Vec<BlockId> {
        let mut released = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.inodes.remove(&cur) else {
                continue;
            };
            match node.kind {
                INodeKind::Directory { children } => stack.extend(children.into_values()),
                INodeKind::File(meta) => released.extend(meta.blocks),
            }
        }
        released
    }

    pub fn lookup(&self, path: &DfsPath) -> Option<InodeId> {
        if !path.is_absolute() {
            return None;
        }
        let mut cur = self.root;
        for seg in path.segments() {
            cur = *self.inodes.get(&cur)?.children()?.get(seg)?;
        }
        Some(cur)
    }

    pub fn resolve(&self, op: Op, path: &DfsPath) -> Result<InodeId> {
        require_absolute(op, path)?;
        self.lookup(path)
            .ok_or_else(|| DfsError::not_found(op, path))
    }

    /// Fail with `NotADirectory` if an existing component of `path` is a file.
    fn check_dir_chain(&self, op: Op, path: &DfsPath) -> Result<()> {
        let mut cur = self.root;
        let mut walked = DfsPath::root();
        for seg in path.segments() {
            let Some(children) = self.node(cur).children() else {
                return Err(DfsError::not_a_directory(op, &walked));
            };
            match children.get(seg) {
                Some(&next) => {
                    cur = next;
                    walked = walked.with_segment(seg);
                }
                None => return Ok(()),
            }
        }
        if self.node(cur).is_dir() {
            Ok(())
        } else {
            Err(DfsError::not_a_directory(op, &walked))
        }
    }

    pub fn stat(&self, path: &DfsPath) -> Result<FileStatus> {
        let id = self.resolve(Op::Stat, path)?;
        Ok(FileStatus::from_inode(path.clone(), self.node(id)))
    }

    /// Children of a directory in name order.
    pub fn list(&self, path: &DfsPath) -> Result<Vec<FileStatus>> {
        let id = self.resolve(Op::ListStatus, path)?;
        let children = self
            .node(id)
            .children()
            .ok_or_else(|| DfsError::not_a_directory(Op::ListStatus, path))?;
        Ok(children
            .iter()
            .map(|(name, &child)| FileStatus::from_inode(path.with_segment(name), self.node(child)))
            .collect())
    }

    /// `mkdir -p`. Returns whether anything was created.
    pub fn mkdirs(&mut self, path: &DfsPath, owner: &Identity, now: i64) -> Result<bool> {
        require_absolute(Op::Mkdirs, path)?;
        if let Some(id) = self.lookup(path) {
            return if self.node(id).is_dir() {
                Ok(false)
            } else {
                Err(DfsError::already_exists(Op::Mkdirs, path))
            };
        }
        self.check_dir_chain(Op::Mkdirs, path)?;

        let mut cur = self.root;
        for seg in path.segments() {
            let existing = self
                .node(cur)
                .children()
                .and_then(|c| c.get(seg))
                .copied();
            cur = match existing {
                Some(next) => next,
                None => {
                    let id = self.alloc_ino();
                    self.inodes.insert(
                        id,
                        INode::directory(
                            id,
                            seg.clone(),
                            Some(cur),
                            Attributes::new(owner, Permission::DIR_DEFAULT, now),
                        ),
                    );
                    self.link(cur, seg, id, now);
                    id
                }
            };
        }
        Ok(true)
    }

    /// Move `src` to `dst`. When `dst` is an existing directory the source
    /// moves beneath it. Returns blocks released by an overwritten file.
    pub fn rename(
        &mut self,
        src: &DfsPath,
        dst: &DfsPath,
        overwrite: bool,
        now: i64,
    ) -> Result<Vec<BlockId>> {
        let op = Op::Rename;
        require_absolute(op, src)?;
        require_absolute(op, dst)?;
        if src.is_root() {
            return Err(DfsError::invalid_path(op, src, "cannot rename the root"));
        }
        let src_id = self.resolve(op, src)?;

        let (target, target_parent) = match self.lookup(dst) {
            Some(id) if self.node(id).is_dir() => (dst.with_segment(src.name()), id),
            _ => {
                let parent = dst.parent().map_err(|e| e.in_op(op))?;
                let parent_id = self
                    .lookup(&parent)
                    .ok_or_else(|| DfsError::not_found(op, &parent))?;
                if !self.node(parent_id).is_dir() {
                    return Err(DfsError::not_a_directory(op, &parent));
                }
                (dst.clone(), parent_id)
            }
        };
        if &target == src {
            return Ok(Vec::new());
        }
        if src.is_ancestor_of(&target) {
            return Err(DfsError::invalid_path(
                op,
                dst,
                "cannot move a directory beneath itself",
            ));
        }

        let existing = self
            .node(target_parent)
            .children()
            .and_then(|c| c.get(target.name()))
            .copied();
        if let Some(existing) = existing {
            let replaceable =
                overwrite && !self.node(existing).is_dir() && !self.node(src_id).is_dir();
            if !replaceable {
                return Err(DfsError::already_exists(op, &target));
            }
        }

        let mut released = Vec::new();
        if let Some(existing) = existing {
            self.unlink(target_parent, target.name(), now);
            released = self.remove_subtree(existing);
        }
        if let Some(old_parent) = self.node(src_id).parent {
            self.unlink(old_parent, src.name(), now);
        }
        if let Some(node) = self.inodes.get_mut(&src_id) {
            node.name = target.name().to_string();
            node.parent = Some(target_parent);
        }
        self.link(target_parent, target.name(), src_id, now);
        Ok(released)
    }

    /// Remove an entry. A non-empty directory needs `recursive`.
    pub fn delete(&mut self, path: &DfsPath, recursive: bool, now: i64) -> Result<Vec<BlockId>> {
        let op = Op::Delete;
        require_absolute(op, path)?;
        if path.is_root() {
            return Err(DfsError::invalid_path(op, path, "cannot delete the root"));
        }
        let id = self.resolve(op, path)?;
        let node = self.node(id);
        if let Some(children) = node.children() {
            if !children.is_empty() && !recursive {
                return Err(DfsError::directory_not_empty(op, path));
            }
        }
        if let Some(parent) = node.parent {
            self.unlink(parent, path.name(), now);
        }
        Ok(self.remove_subtree(id))
    }

    /// Create an empty file, creating missing parent directories. Returns
    /// the handle and blocks released by an overwritten file.
    pub fn create_file(
        &mut self,
        path: &DfsPath,
        block_size: NonZeroU64,
        replication: NonZeroU16,
        overwrite: bool,
        owner: &Identity,
        now: i64,
    ) -> Result<(FileHandle, Vec<BlockId>)> {
        let op = Op::CreateFile;
        require_absolute(op, path)?;
        if path.is_root() {
            return Err(DfsError::already_exists(op, path));
        }
        let parent_path = path.parent().map_err(|e| e.in_op(op))?;
        self.check_dir_chain(op, &parent_path)?;
        let existing = self.lookup(path);
        if let Some(id) = existing {
            if self.node(id).is_dir() || !overwrite {
                return Err(DfsError::already_exists(op, path));
            }
        }

        self.mkdirs(&parent_path, owner, now)
            .map_err(|e| e.in_op(op))?;
        let parent = self
            .lookup(&parent_path)
            .ok_or_else(|| DfsError::not_found(op, &parent_path))?;
        let mut released = Vec::new();
        if let Some(old) = existing {
            self.unlink(parent, path.name(), now);
            released = self.remove_subtree(old);
        }

        let id = self.alloc_ino();
        self.inodes.insert(
            id,
            INode::file(
                id,
                path.name().to_string(),
                Some(parent),
                Attributes::new(owner, Permission::FILE_DEFAULT, now),
                FileMeta::new(block_size, replication),
            ),
        );
        self.link(parent, path.name(), id, now);
        let handle = FileHandle {
            ino: id,
            path: path.clone(),
            block_size,
            replication,
        };
        Ok((handle, released))
    }

    /// Look up a file for reading.
    pub fn open(&self, path: &DfsPath) -> Result<FileHandle> {
        let id = self.resolve(Op::Open, path)?;
        match &self.node(id).kind {
            INodeKind::File(meta) => Ok(FileHandle {
                ino: id,
                path: path.clone(),
                block_size: meta.block_size,
                replication: meta.replication,
            }),
            INodeKind::Directory { .. } => {
                Err(DfsError::invalid_path(Op::Open, path, "is a directory"))
            }
        }
    }

    pub fn touch_access(&mut self, id: InodeId, now: i64) {
        if let Some(node) = self.inodes.get_mut(&id) {
            node.attrs.atime = now;
        }
    }

    pub fn file(&self, op: Op, handle: &FileHandle) -> Result<&FileMeta> {
        self.inodes
            .get(&handle.ino)
            .and_then(INode::file_meta)
            .ok_or_else(|| DfsError::not_found(op, &handle.path))
    }

    pub(crate) fn file_mut(
        &mut self,
        op: Op,
        handle: &FileHandle,
    ) -> Result<(&mut Attributes, &mut FileMeta)> {
        match self.inodes.get_mut(&handle.ino) {
            Some(INode {
                attrs,
                kind: INodeKind::File(meta),
                ..
            }) => Ok((attrs, meta)),
            _ => Err(DfsError::not_found(op, &handle.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::meta::inode::FileState;

    fn p(raw: &str) -> DfsPath {
        DfsPath::parse(raw).unwrap()
    }

    fn ns() -> Namespace {
        Namespace::new(&Identity::new("hdfs"), 0)
    }

    fn bs() -> NonZeroU64 {
        NonZeroU64::new(128).unwrap()
    }

    fn rep() -> NonZeroU16 {
        NonZeroU16::new(2).unwrap()
    }

    fn create(ns: &mut Namespace, raw: &str) -> FileHandle {
        ns.create_file(&p(raw), bs(), rep(), false, &Identity::new("atguigu"), 1)
            .unwrap()
            .0
    }

    #[test]
    fn test_mkdirs_creates_intermediates_and_lists_one_child() {
        let mut ns = ns();
        let me = Identity::new("atguigu");
        assert!(ns.mkdirs(&p("/a/b"), &me, 1).unwrap());
        let listing = ns.list(&p("/a")).unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].is_dir());
        assert_eq!(listing[0].name(), "b");
        assert_eq!(listing[0].owner, "atguigu");
        assert_eq!(listing[0].path.to_string(), "/a/b");
    }

    #[test]
    fn test_mkdirs_is_idempotent() {
        let mut once = ns();
        let me = Identity::new("atguigu");
        once.mkdirs(&p("/x/y"), &me, 5).unwrap();
        let mut twice = once.clone();
        assert!(!twice.mkdirs(&p("/x/y"), &me, 9).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_mkdirs_under_file_fails() {
        let mut ns = ns();
        create(&mut ns, "/a/f.txt");
        let before = ns.clone();
        let err = ns
            .mkdirs(&p("/a/f.txt/sub/dir"), &Identity::new("u"), 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
        assert_eq!(err.path(), Some("/a/f.txt"));
        assert_eq!(ns, before);

        let err = ns.mkdirs(&p("/a/f.txt"), &Identity::new("u"), 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_stat_and_list_errors() {
        let mut ns = ns();
        create(&mut ns, "/f.txt");
        assert_eq!(ns.stat(&p("/nope")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            ns.list(&p("/f.txt")).unwrap_err().kind(),
            ErrorKind::NotADirectory
        );
        assert_eq!(
            ns.stat(&p("relative")).unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_list_is_name_ordered() {
        let mut ns = ns();
        for name in ["/d/zeta", "/d/alpha", "/d/mid"] {
            create(&mut ns, name);
        }
        let names: Vec<String> = ns
            .list(&p("/d"))
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_rename_moves_inode() {
        let mut ns = ns();
        let h = create(&mut ns, "/xiyou/huaguoshan/wordcount.txt");
        let before = ns.stat(&p("/xiyou/huaguoshan/wordcount.txt")).unwrap();
        ns.rename(
            &p("/xiyou/huaguoshan/wordcount.txt"),
            &p("/xiyou/huaguoshan/wordcount1.txt"),
            false,
            7,
        )
        .unwrap();
        let after = ns.stat(&p("/xiyou/huaguoshan/wordcount1.txt")).unwrap();
        assert_eq!(after.ino, h.ino);
        assert_eq!(after.length, before.length);
        assert_eq!(after.owner, before.owner);
        assert_eq!(
            ns.stat(&p("/xiyou/huaguoshan/wordcount.txt"))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_rename_into_existing_directory() {
        let mut ns = ns();
        create(&mut ns, "/a/f.txt");
        ns.mkdirs(&p("/b"), &Identity::new("u"), 1).unwrap();
        ns.rename(&p("/a/f.txt"), &p("/b"), false, 2).unwrap();
        assert!(ns.stat(&p("/b/f.txt")).unwrap().is_file());
        assert!(ns.list(&p("/a")).unwrap().is_empty());
    }

    #[test]
    fn test_rename_conflicts() {
        let mut ns = ns();
        create(&mut ns, "/a");
        create(&mut ns, "/b");
        let before = ns.clone();
        let err = ns.rename(&p("/a"), &p("/b"), false, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(ns, before);

        assert_eq!(
            ns.rename(&p("/missing"), &p("/c"), false, 2)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ns.rename(&p("/a"), &p("/no/such/dir/c"), false, 2)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ns.rename(&DfsPath::root(), &p("/c"), false, 2)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_rename_overwrite_releases_old_blocks() {
        let mut ns = ns();
        create(&mut ns, "/a");
        let b = create(&mut ns, "/b");
        ns.file_mut(Op::AllocateBlocks, &b).unwrap().1.blocks.push(BlockId(42));
        let released = ns.rename(&p("/a"), &p("/b"), true, 3).unwrap();
        assert_eq!(released, vec![BlockId(42)]);
        assert!(ns.stat(&p("/a")).is_err());
    }

    #[test]
    fn test_rename_directory_beneath_itself_fails() {
        let mut ns = ns();
        ns.mkdirs(&p("/a/b"), &Identity::new("u"), 1).unwrap();
        let err = ns.rename(&p("/a"), &p("/a/b"), false, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        assert!(ns.stat(&p("/a/b")).is_ok());
    }

    #[test]
    fn test_delete_semantics() {
        let mut ns = ns();
        create(&mut ns, "/dir/sub/f.txt");
        ns.mkdirs(&p("/empty"), &Identity::new("u"), 1).unwrap();

        let before = ns.clone();
        let err = ns.delete(&p("/dir"), false, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);
        assert_eq!(ns, before);

        ns.delete(&p("/empty"), false, 2).unwrap();
        assert_eq!(ns.stat(&p("/empty")).unwrap_err().kind(), ErrorKind::NotFound);

        ns.delete(&p("/dir"), true, 3).unwrap();
        assert_eq!(ns.stat(&p("/dir")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            ns.stat(&p("/dir/sub/f.txt")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        // only the root is left
        assert_eq!(ns.len(), 1);

        assert_eq!(
            ns.delete(&DfsPath::root(), true, 4).unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
        assert_eq!(
            ns.delete(&p("/gone"), true, 4).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_create_file_rules() {
        let mut ns = ns();
        let h = create(&mut ns, "/x/y/f.txt");
        let st = ns.stat(&h.path).unwrap();
        assert_eq!(st.state, Some(FileState::UnderConstruction));
        assert_eq!(st.replication, 2);
        assert_eq!(st.block_size, 128);
        assert!(ns.stat(&p("/x/y")).unwrap().is_dir());

        let me = Identity::new("u");
        let err = ns
            .create_file(&p("/x/y/f.txt"), bs(), rep(), false, &me, 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = ns
            .create_file(&p("/x/y"), bs(), rep(), true, &me, 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = ns
            .create_file(&p("/x/y/f.txt/inner"), bs(), rep(), true, &me, 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);

        let (again, _) = ns
            .create_file(&p("/x/y/f.txt"), bs(), rep(), true, &me, 2)
            .unwrap();
        assert_ne!(again.ino, h.ino);
        assert_eq!(ns.stat(&h.path).unwrap().owner, "u");
    }

    #[test]
    fn test_open_rejects_directories() {
        let mut ns = ns();
        create(&mut ns, "/d/f");
        assert!(ns.open(&p("/d/f")).is_ok());
        assert_eq!(ns.open(&p("/d")).unwrap_err().kind(), ErrorKind::InvalidPath);
    }
}
