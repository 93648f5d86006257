//! 客户端会话：连接集群、解析路径，并执行命名空间与数据传输操作。

use super::config::{ClientOptions, EffectiveConfig};
use super::iter::LocatedFileIter;
use super::protocol::{ClusterEndpoint, Connection, Connector, CreateRequest};
use super::transfer::{self, GetReport, PutReport};
use crate::block::Block;
use crate::error::{DfsError, ErrorKind, Op, PathHint, Result};
use crate::meta::{CommittedBlock, FileHandle, FileStatus, Identity};
use crate::path::DfsPath;
use bytes::BytesMut;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Deadline shared by every step of one session call.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    after: Duration,
}

impl Deadline {
    /// 超出 `Instant` 可表示范围的超时视为不设截止时间。
    fn start(timeout: Option<Duration>) -> Option<Self> {
        let after = timeout?;
        let at = Instant::now().checked_add(after)?;
        Some(Deadline { at, after })
    }
}

async fn within<T>(
    deadline: Option<Deadline>,
    op: Op,
    path: impl Into<PathHint>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(deadline) = deadline else {
        return fut.await;
    };
    match tokio::time::timeout_at(deadline.at, fut).await {
        Ok(res) => res,
        Err(_) => Err(DfsError::Timeout {
            op,
            path: path.into(),
            after: deadline.after,
        }),
    }
}

fn check_cancelled(cancel: &CancellationToken, op: Op, path: &DfsPath) -> Result<()> {
    if cancel.is_cancelled() {
        Err(DfsError::transfer(op, path, "cancelled"))
    } else {
        Ok(())
    }
}

/// Client handle for one identity talking to one cluster.
///
/// Calls that change the namespace take `&mut self`; lookups take `&self`.
/// Relative paths are resolved against `/user/<user>`. Dropping a session
/// closes it.
pub struct Session {
    endpoint: ClusterEndpoint,
    identity: Identity,
    options: ClientOptions,
    working_dir: DfsPath,
    state: SessionState,
    conn: Option<Connection>,
    config: Option<EffectiveConfig>,
}

impl Session {
    pub fn new(endpoint: ClusterEndpoint, identity: Identity, options: ClientOptions) -> Self {
        let working_dir = DfsPath::root()
            .with_segment("user")
            .with_segment(&identity.user);
        Self {
            endpoint,
            identity,
            options,
            working_dir,
            state: SessionState::Disconnected,
            conn: None,
            config: None,
        }
    }

    /// Parse `endpoint`, then connect as `user`.
    pub async fn connect_to(
        connector: &dyn Connector,
        endpoint: &str,
        user: &str,
        options: ClientOptions,
    ) -> Result<Session> {
        let endpoint = ClusterEndpoint::parse(endpoint)?;
        let mut session = Session::new(endpoint, Identity::new(user), options);
        session.connect(connector).await?;
        Ok(session)
    }

    /// Establish the connection and agree on effective settings.
    #[tracing::instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint, user = %self.identity.user))]
    pub async fn connect(&mut self, connector: &dyn Connector) -> Result<()> {
        let op = Op::Connect;
        match self.state {
            SessionState::Connected => return Ok(()),
            SessionState::Closed => {
                return Err(DfsError::session_closed(op, PathHint::none()));
            }
            SessionState::Disconnected | SessionState::Connecting => {}
        }
        self.state = SessionState::Connecting;

        let deadline = Deadline::start(self.options.timeout);
        let res = within(deadline, op, PathHint::none(), async {
            let conn = connector.connect(&self.endpoint).await?;
            let defaults = conn.name_service.handshake(&self.identity).await?;
            Ok::<_, DfsError>((conn, defaults))
        })
        .await;

        match res {
            Ok((conn, defaults)) => {
                let config = self.options.resolve(&defaults);
                tracing::info!(
                    endpoint = %self.endpoint,
                    user = %self.identity.user,
                    replication = config.replication.get(),
                    block_size = config.block_size.get(),
                    "session connected"
                );
                self.conn = Some(conn);
                self.config = Some(config);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e.in_op(op))
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn working_dir(&self) -> &DfsPath {
        &self.working_dir
    }

    /// Settings agreed in the handshake; `None` before connecting.
    pub fn config(&self) -> Option<&EffectiveConfig> {
        self.config.as_ref()
    }

    fn conn(&self, op: Op, path: &DfsPath) -> Result<Connection> {
        match (self.state, &self.conn) {
            (SessionState::Connected, Some(conn)) => Ok(conn.clone()),
            _ => Err(DfsError::session_closed(op, path)),
        }
    }

    fn effective(&self, op: Op, path: &DfsPath) -> Result<EffectiveConfig> {
        self.config.ok_or_else(|| DfsError::session_closed(op, path))
    }

    fn resolve(&self, op: Op, raw: &str) -> Result<DfsPath> {
        let path = DfsPath::parse(raw).map_err(|e| e.in_op(op))?;
        Ok(path.resolve(&self.working_dir))
    }

    fn deadline(&self) -> Option<Deadline> {
        Deadline::start(self.config.and_then(|c| c.timeout))
    }

    /// `mkdir -p`. Returns whether anything was created.
    pub async fn mkdirs(&mut self, path: &str) -> Result<bool> {
        let op = Op::Mkdirs;
        let path = self.resolve(op, path)?;
        let conn = self.conn(op, &path)?;
        within(
            self.deadline(),
            op,
            &path,
            conn.name_service.mkdirs(&path, &self.identity),
        )
        .await
        .map_err(|e| e.in_op(op))
    }

    pub async fn stat(&self, path: &str) -> Result<FileStatus> {
        let op = Op::Stat;
        let path = self.resolve(op, path)?;
        let conn = self.conn(op, &path)?;
        within(self.deadline(), op, &path, conn.name_service.stat(&path))
            .await
            .map_err(|e| e.in_op(op))
    }

    /// Direct children of a directory in name order.
    pub async fn list_status(&self, path: &str) -> Result<Vec<FileStatus>> {
        let op = Op::ListStatus;
        let path = self.resolve(op, path)?;
        let conn = self.conn(op, &path)?;
        within(self.deadline(), op, &path, conn.name_service.list_status(&path))
            .await
            .map_err(|e| e.in_op(op))
    }

    /// Files (not directories) under `path`, descending into
    /// subdirectories when `recursive` is set. The listing reflects the
    /// namespace at the moment of the call.
    pub fn list_files(&self, path: &str, recursive: bool) -> Result<LocatedFileIter> {
        let op = Op::ListFiles;
        let path = self.resolve(op, path)?;
        let conn = self.conn(op, &path)?;
        LocatedFileIter::new(conn.name_service.snapshot(), path, recursive)
    }

    pub fn list_files_recursive(&self, path: &str) -> Result<LocatedFileIter> {
        self.list_files(path, true)
    }

    pub async fn rename(&mut self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let op = Op::Rename;
        let src = self.resolve(op, src)?;
        let dst = self.resolve(op, dst)?;
        let conn = self.conn(op, &src)?;
        within(
            self.deadline(),
            op,
            &src,
            conn.name_service.rename(&src, &dst, overwrite),
        )
        .await
        .map_err(|e| e.in_op(op))
    }

    pub async fn delete(&mut self, path: &str, recursive: bool) -> Result<()> {
        let op = Op::Delete;
        let path = self.resolve(op, path)?;
        let conn = self.conn(op, &path)?;
        within(
            self.deadline(),
            op,
            &path,
            conn.name_service.delete(&path, recursive),
        )
        .await
        .map_err(|e| e.in_op(op))
    }

    pub async fn copy_from_local(
        &mut self,
        local_src: impl AsRef<Path>,
        remote_dst: &str,
        delete_source: bool,
        overwrite: bool,
    ) -> Result<PutReport> {
        self.copy_from_local_cancellable(
            local_src,
            remote_dst,
            delete_source,
            overwrite,
            &CancellationToken::new(),
        )
        .await
    }

    /// Upload a local file. `cancel` is checked between blocks; a cancelled,
    /// failed or timed-out upload leaves the remote file marked corrupt.
    #[tracing::instrument(level = "debug", skip_all, fields(dst = remote_dst))]
    pub async fn copy_from_local_cancellable(
        &mut self,
        local_src: impl AsRef<Path>,
        remote_dst: &str,
        delete_source: bool,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<PutReport> {
        let op = Op::CopyFromLocal;
        let dst = self.resolve(op, remote_dst)?;
        let conn = self.conn(op, &dst)?;
        let cfg = self.effective(op, &dst)?;
        let local = local_src.as_ref();
        let deadline = self.deadline();

        let meta = fs::metadata(local).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DfsError::not_found(op, local),
            _ => DfsError::transfer(op, local, e),
        })?;
        if !meta.is_file() {
            return Err(DfsError::invalid_path(op, local, "not a regular file"));
        }
        let length = meta.len();

        let (target, handle) = within(deadline, op, &dst, async {
            let target = match conn.name_service.stat(&dst).await {
                Ok(st) if st.is_dir() => {
                    let name = local
                        .file_name()
                        .and_then(|n| n.to_str())
                        .ok_or_else(|| DfsError::invalid_path(op, local, "no usable file name"))?;
                    dst.child(name)?
                }
                Ok(_) => dst.clone(),
                Err(e) if e.kind() == ErrorKind::NotFound => dst.clone(),
                Err(e) => return Err(e),
            };
            let handle = conn
                .name_service
                .create_file(CreateRequest {
                    path: target.clone(),
                    block_size: cfg.block_size,
                    replication: cfg.replication,
                    overwrite,
                    owner: self.identity.clone(),
                })
                .await?;
            Ok::<_, DfsError>((target, handle))
        })
        .await
        .map_err(|e| e.in_op(op))?;

        let mut written = Vec::new();
        let res = within(
            deadline,
            op,
            &target,
            upload(&conn, &handle, local, length, cancel, &mut written),
        )
        .await
        .map_err(|e| e.in_op(op));

        let (warnings, blocks) = match res {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(path = %target, error = %e, "upload failed");
                let Err(mark) = conn.name_service.mark_corrupt(&handle).await else {
                    return Err(e);
                };
                // 文件在上传途中被删除或覆盖，已写出的副本不再被元数据引用
                tracing::warn!(
                    path = %target,
                    error = %mark,
                    blocks = written.len(),
                    "file vanished during upload, discarding written replicas"
                );
                transfer::discard_replicas(conn.datanodes.as_ref(), &written).await;
                return Err(match e.kind() {
                    ErrorKind::NotFound => DfsError::transfer(
                        op,
                        &target,
                        "file was deleted or replaced during upload",
                    ),
                    _ => e,
                });
            }
        };

        if delete_source {
            fs::remove_file(local)
                .await
                .map_err(|e| DfsError::transfer(op, local, e))?;
        }

        tracing::info!(
            path = %target,
            bytes = length,
            blocks,
            warnings = warnings.len(),
            "copyFromLocal"
        );
        Ok(PutReport {
            path: target,
            bytes: length,
            blocks,
            warnings,
        })
    }

    pub async fn copy_to_local(
        &mut self,
        remote_src: &str,
        local_dst: impl AsRef<Path>,
        delete_source: bool,
        verify_checksum: bool,
    ) -> Result<GetReport> {
        self.copy_to_local_cancellable(
            remote_src,
            local_dst,
            delete_source,
            verify_checksum,
            &CancellationToken::new(),
        )
        .await
    }

    /// Download a complete file. Bytes are staged next to the destination
    /// and renamed into place only once every block has been read.
    #[tracing::instrument(level = "debug", skip_all, fields(src = remote_src))]
    pub async fn copy_to_local_cancellable(
        &mut self,
        remote_src: &str,
        local_dst: impl AsRef<Path>,
        delete_source: bool,
        verify_checksum: bool,
        cancel: &CancellationToken,
    ) -> Result<GetReport> {
        let op = Op::CopyToLocal;
        let src = self.resolve(op, remote_src)?;
        let conn = self.conn(op, &src)?;
        let deadline = self.deadline();

        let mut dest = local_dst.as_ref().to_path_buf();
        if fs::metadata(&dest).await.is_ok_and(|m| m.is_dir()) {
            dest.push(src.name());
        }
        let staging = transfer::staging_path(&dest);

        let res = within(
            deadline,
            op,
            &src,
            download(&conn, &src, &dest, &staging, verify_checksum, cancel),
        )
        .await
        .map_err(|e| e.in_op(op));

        let report = match res {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(path = %src, error = %e, "download failed");
                match fs::remove_file(&staging).await {
                    Err(rm) if rm.kind() != std::io::ErrorKind::NotFound => {
                        tracing::warn!(
                            staging = %staging.display(),
                            error = %rm,
                            "failed to remove staging file"
                        );
                    }
                    _ => {}
                }
                return Err(e);
            }
        };

        if delete_source {
            within(deadline, op, &src, conn.name_service.delete(&src, false))
                .await
                .map_err(|e| e.in_op(op))?;
        }
        tracing::info!(path = %src, local = %dest.display(), bytes = report.bytes, "copyToLocal");
        Ok(report)
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if self.conn.take().is_some() {
            tracing::info!(endpoint = %self.endpoint, user = %self.identity.user, "session closed");
        }
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Stream `local` into the blocks of `handle` and finalize it. Returns the
/// replica shortfall warnings and the number of blocks written.
///
/// Every block is pushed onto `written` before its replicas are sent, so the
/// caller can discard them if the upload does not finish.
async fn upload(
    conn: &Connection,
    handle: &FileHandle,
    local: &Path,
    length: u64,
    cancel: &CancellationToken,
    written: &mut Vec<Block>,
) -> Result<(Vec<DfsError>, usize)> {
    let op = Op::CopyFromLocal;
    let path = &handle.path;
    let requested = handle.replication.get() as usize;
    let mut warnings = Vec::new();

    let alloc = conn.name_service.allocate_blocks(handle, length).await?;
    if let Some(shortfall) = alloc.shortfall {
        warnings.push(DfsError::InsufficientReplicas {
            op,
            path: path.into(),
            requested: shortfall.requested,
            placed: shortfall.placed,
        });
    }

    let mut file = fs::File::open(local)
        .await
        .map_err(|e| DfsError::transfer(op, local, e))?;
    let mut committed = Vec::with_capacity(alloc.blocks.len());
    for block in &alloc.blocks {
        check_cancelled(cancel, op, path)?;

        let mut buf = BytesMut::zeroed(block.length as usize);
        file.read_exact(&mut buf)
            .await
            .map_err(|e| DfsError::transfer(op, local, e))?;
        let data = buf.freeze();
        let checksum = transfer::checksum(&data);

        written.push(block.clone());
        let (acked, failed) =
            transfer::write_replicas(conn.datanodes.as_ref(), block, data).await;
        if acked.is_empty() {
            let reason = failed
                .into_iter()
                .map(|(host, e)| format!("{host}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DfsError::transfer(
                op,
                path,
                format!("no replica of {} was written ({reason})", block.id),
            ));
        }
        if !failed.is_empty() {
            warnings.push(DfsError::InsufficientReplicas {
                op,
                path: path.into(),
                requested,
                placed: acked.len(),
            });
        }
        committed.push(CommittedBlock {
            id: block.id,
            checksum,
            replicas: acked,
        });
    }
    check_cancelled(cancel, op, path)?;
    let blocks = committed.len();
    conn.name_service.complete(handle, committed).await?;
    Ok((warnings, blocks))
}

async fn download(
    conn: &Connection,
    src: &DfsPath,
    dest: &Path,
    staging: &Path,
    verify: bool,
    cancel: &CancellationToken,
) -> Result<GetReport> {
    let op = Op::CopyToLocal;
    let handle = conn.name_service.open(src).await?;
    let blocks = conn.name_service.locate(&handle).await?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DfsError::transfer(op, parent, e))?;
    }
    let mut out = fs::File::create(staging)
        .await
        .map_err(|e| DfsError::transfer(op, staging, e))?;
    let mut bytes = 0u64;
    for block in &blocks {
        check_cancelled(cancel, op, src)?;
        let data = transfer::read_block(conn.datanodes.as_ref(), op, src, block, verify).await?;
        out.write_all(&data)
            .await
            .map_err(|e| DfsError::transfer(op, staging, e))?;
        bytes += data.len() as u64;
    }
    out.flush()
        .await
        .map_err(|e| DfsError::transfer(op, staging, e))?;
    out.sync_all()
        .await
        .map_err(|e| DfsError::transfer(op, staging, e))?;
    drop(out);
    fs::rename(staging, dest)
        .await
        .map_err(|e| DfsError::transfer(op, dest, e))?;
    Ok(GetReport {
        local: dest.to_path_buf(),
        bytes,
        blocks: blocks.len(),
    })
}
