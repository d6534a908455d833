//! Unix socket transport for the tunnel control plane.
//!
//! Each running tunnel owns one socket; frames are length-prefixed
//! JSON payloads decoded by the [`proto`](crate::proto) module.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::host::TunnelHost;

/// Length prefix on every frame, little-endian.
const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on a single frame payload.
const MAX_FRAME_LEN: usize = 64 * 1024;

const SOCKET_DIR: &str = "wgtund";
const SOCKET_SUFFIX: &str = ".sock";

/// Control socket path for an interface.
///
/// Prefers `$XDG_RUNTIME_DIR/wgtund/<interface>.sock`, falling back to
/// `/tmp/wgtund-<uid>-<interface>.sock` when no runtime dir is set.
pub fn socket_path(interface: &str) -> PathBuf {
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        let dir = PathBuf::from(runtime_dir).join(SOCKET_DIR);
        return dir.join(format!("{}{}", interface, SOCKET_SUFFIX));
    }
    let uid = unsafe { libc::geteuid() };
    PathBuf::from(format!("/tmp/wgtund-{}-{}{}", uid, interface, SOCKET_SUFFIX))
}

/// Enumerates control sockets left by running tunnels.
///
/// Returns `(interface, path)` pairs. Stale sockets from crashed
/// processes show up here too; callers find out when they connect.
pub fn list_sockets() -> Vec<(String, PathBuf)> {
    let mut found = Vec::new();

    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        let dir = PathBuf::from(runtime_dir).join(SOCKET_DIR);
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(iface) = name.strip_suffix(SOCKET_SUFFIX) {
                        found.push((iface.to_string(), entry.path()));
                    }
                }
            }
        }
        return found;
    }

    let uid = unsafe { libc::geteuid() };
    let prefix = format!("wgtund-{}-", uid);
    if let Ok(entries) = std::fs::read_dir("/tmp") {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(rest) = name.strip_prefix(&prefix) {
                    if let Some(iface) = rest.strip_suffix(SOCKET_SUFFIX) {
                        found.push((iface.to_string(), entry.path()));
                    }
                }
            }
        }
    }
    found
}

/// Removes the socket file when the server shuts down.
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove socket {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Checks whether a leftover path can be reclaimed.
///
/// A live socket means another instance owns this interface. A dead
/// socket from a crashed process is removed so the bind can proceed.
fn check_and_cleanup_stale_socket(path: &Path) -> Result<(), ControlError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ControlError::Io(e)),
    };

    if !metadata.file_type().is_socket() {
        return Err(ControlError::NotASocket(path.to_path_buf()));
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Err(ControlError::AlreadyRunning(path.to_path_buf())),
        Err(_) => {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
            Ok(())
        }
    }
}

/// Binds a control socket at `path`, reclaiming stale leftovers.
///
/// The socket is owner-only; the guard unlinks it on drop.
pub fn bind_socket(path: &Path) -> Result<(UnixListener, SocketGuard), ControlError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    check_and_cleanup_stale_socket(path)?;

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    Ok((
        listener,
        SocketGuard {
            path: path.to_path_buf(),
        },
    ))
}

/// Reads one length-prefixed frame. `None` on clean EOF.
pub async fn read_frame<S>(stream: &mut S) -> Result<Option<Vec<u8>>, ControlError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ControlError::Io(e)),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ControlError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Writes one length-prefixed frame. An empty payload is a valid
/// frame; the server uses it to signal "no response".
pub async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> Result<(), ControlError>
where
    S: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(ControlError::FrameTooLarge(payload.len()));
    }
    let header = (payload.len() as u32).to_le_bytes();
    stream.write_all(&header).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Accepts control connections and forwards frames to the host.
pub struct ControlServer {
    listener: UnixListener,
    _guard: SocketGuard,
    host: Arc<dyn TunnelHost>,
}

impl ControlServer {
    /// Binds the conventional socket for `interface`.
    pub fn bind(interface: &str, host: Arc<dyn TunnelHost>) -> Result<Self, ControlError> {
        Self::bind_at(&socket_path(interface), host)
    }

    /// Binds at an explicit path.
    pub fn bind_at(path: &Path, host: Arc<dyn TunnelHost>) -> Result<Self, ControlError> {
        let (listener, guard) = bind_socket(path)?;
        info!("Control socket listening on {}", path.display());
        Ok(Self {
            listener,
            _guard: guard,
            host,
        })
    }

    pub fn local_path(&self) -> &Path {
        self._guard.path()
    }

    /// Serves connections until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Control server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let host = Arc::clone(&self.host);
                            let conn_shutdown = shutdown.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, host, conn_shutdown).await {
                                    debug!("Control connection ended: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("Control accept failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Per-connection loop. Every request frame gets exactly one reply
/// frame; requests the host declines to answer get an empty one.
async fn handle_connection(
    mut stream: UnixStream,
    host: Arc<dyn TunnelHost>,
    shutdown: CancellationToken,
) -> Result<(), ControlError> {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut stream) => frame?,
        };
        let Some(request) = frame else {
            return Ok(());
        };

        let reply = host.handle_message(&request).await.unwrap_or_default();
        write_frame(&mut stream, &reply).await?;
    }
}
