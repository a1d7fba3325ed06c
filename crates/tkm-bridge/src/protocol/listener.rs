//! Event-channel listener.
//!
//! The key manager is the connecting side of the event channel: the daemon
//! binds a socket, the key manager connects and pushes requests (ESP SA
//! expiry) that the daemon acknowledges. The listener must outlive nothing:
//! during shutdown the runtime context is torn down first, so a late push
//! can never reference handles that were already freed, and only then is
//! this listener stopped and its socket file removed.
//!
//! # Socket hygiene
//!
//! - The parent directory is created with mode 0700 if absent; an existing
//!   directory's permissions are left alone so a misconfigured path cannot
//!   clobber a system directory.
//! - Symlinks are refused, both for the parent directory and the socket
//!   path itself.
//! - A stale socket file from a previous run is removed before binding; a
//!   path that exists but is not a socket is refused.
//! - The bound socket gets mode 0600: only the key manager peer running as
//!   the same user may connect.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener as TokioUnixListener, UnixStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::error::{ProtocolError, ProtocolResult};
use super::framing::FrameCodec;
use super::messages::{decode_message, encode_message, EventRequest, EventResponse};

/// Socket permissions for the event socket (owner read/write only).
const EVENT_SOCKET_MODE: u32 = 0o600;

/// Directory permissions when this listener creates the parent (owner only).
const DIRECTORY_MODE: u32 = 0o700;

/// Maximum concurrent event connections.
///
/// There is exactly one legitimate peer; the ceiling only guards against a
/// runaway peer re-connecting in a loop.
const MAX_CONNECTIONS: usize = 8;

/// Receiver of key manager pushes.
///
/// Implementations route the push into the surrounding daemon: look up the
/// association for `sp_id`, initiate rekey or teardown, and release the
/// affected handles. Returning `Err` answers the push with an error frame.
pub trait EventHandler: Send + Sync + 'static {
    /// An ESP security association expired inside the key manager.
    ///
    /// # Errors
    ///
    /// Returns a reason string if the push cannot be honored; the reason is
    /// sent back to the key manager verbatim.
    fn esp_sa_expired(&self, sp_id: u64, protocol: u8, soft: bool) -> Result<(), String>;
}

/// Bound-but-not-yet-serving event socket.
#[derive(Debug)]
pub struct EventListener {
    path: PathBuf,
    listener: TokioUnixListener,
}

impl EventListener {
    /// Bind the event socket at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the parent directory cannot be
    /// prepared, a stale non-socket file occupies the path, or the bind or
    /// permission change fails.
    pub fn bind(path: &Path) -> ProtocolResult<Self> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        cleanup_socket_file(path)?;

        let listener = TokioUnixListener::bind(path).map_err(|e| {
            ProtocolError::Io(io::Error::new(
                e.kind(),
                format!("failed to bind event socket {}: {e}", path.display()),
            ))
        })?;
        set_socket_permissions(path, EVENT_SOCKET_MODE)?;

        info!(socket = %path.display(), "event socket bound");
        Ok(Self {
            path: path.to_path_buf(),
            listener,
        })
    }

    /// Path the socket is bound at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the accept loop, dispatching pushes to `handler`.
    pub fn serve(self, handler: Arc<dyn EventHandler>) -> EventListenerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let path = self.path.clone();
        let listener = self.listener;
        let connection_sem = Arc::new(Semaphore::new(MAX_CONNECTIONS));

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // Either a shutdown signal or the handle is gone.
                        let _ = changed;
                        break;
                    }
                    next = accept_with_permit(&listener, &connection_sem) => {
                        match next {
                            Ok((stream, permit)) => {
                                debug!("event connection accepted");
                                let handler = Arc::clone(&handler);
                                tokio::spawn(serve_connection(stream, handler, permit));
                            }
                            Err(e) => {
                                warn!("event socket accept failed: {e}");
                            }
                        }
                    }
                }
            }
        });

        EventListenerHandle {
            path,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Running accept loop; stopping it removes the socket file.
#[derive(Debug)]
pub struct EventListenerHandle {
    path: PathBuf,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl EventListenerHandle {
    /// Path the socket is bound at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting, wait for the loop to exit, remove the socket file.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("event listener task failed: {e}");
            }
        }
        remove_socket_file(&self.path);
        info!(socket = %self.path.display(), "event socket closed");
    }
}

impl Drop for EventListenerHandle {
    fn drop(&mut self) {
        // Best-effort cleanup when the handle is dropped without an orderly
        // shutdown.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        remove_socket_file(&self.path);
    }
}

/// Wait for a connection slot, then for a connection.
///
/// Keeping both waits inside one future lets the accept loop stay
/// responsive to shutdown even while the connection ceiling is reached.
async fn accept_with_permit(
    listener: &TokioUnixListener,
    connection_sem: &Arc<Semaphore>,
) -> io::Result<(UnixStream, OwnedSemaphorePermit)> {
    let permit = Arc::clone(connection_sem)
        .acquire_owned()
        .await
        .map_err(|_| io::Error::other("connection semaphore closed"))?;
    let (stream, _addr) = listener.accept().await?;
    Ok((stream, permit))
}

/// Serve one event connection until the peer hangs up or violates the
/// protocol.
async fn serve_connection(
    stream: UnixStream,
    handler: Arc<dyn EventHandler>,
    _permit: OwnedSemaphorePermit,
) {
    let mut framed = Framed::new(stream, FrameCodec::new());
    while let Some(result) = framed.next().await {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                warn!("event connection framing error: {e}");
                break;
            }
        };
        let request = match decode_message::<EventRequest>(&frame) {
            Ok(request) => request,
            Err(e) => {
                // A peer speaking garbage is dropped, not argued with.
                warn!("invalid event request: {e}");
                break;
            }
        };
        let response = dispatch(handler.as_ref(), &request);
        let frame = match encode_message(&response) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode event response: {e}");
                break;
            }
        };
        if let Err(e) = framed.send(frame).await {
            warn!("failed to send event response: {e}");
            break;
        }
    }
    debug!("event connection closed");
}

fn dispatch(handler: &dyn EventHandler, request: &EventRequest) -> EventResponse {
    match *request {
        EventRequest::EspSaExpired {
            sp_id,
            protocol,
            soft,
        } => match handler.esp_sa_expired(sp_id, protocol, soft) {
            Ok(()) => EventResponse::Ack,
            Err(reason) => {
                warn!(sp_id, protocol, soft, %reason, "expiry push refused");
                EventResponse::Error { reason }
            }
        },
    }
}

/// Ensure the socket's parent directory exists.
///
/// Refuses symlinks and non-directories. Permissions of pre-existing
/// directories are not touched; mode 0700 is only applied to directories
/// this call creates.
fn ensure_directory(path: &Path) -> ProtocolResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_symlink() {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "{} is a symlink, refusing to use as socket directory",
                        path.display()
                    ),
                )));
            }
            if !metadata.is_dir() {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists but is not a directory", path.display()),
                )));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(path).map_err(|e| {
                ProtocolError::Io(io::Error::new(
                    e.kind(),
                    format!("failed to create directory {}: {e}", path.display()),
                ))
            })?;
            let perms = std::fs::Permissions::from_mode(DIRECTORY_MODE);
            std::fs::set_permissions(path, perms).map_err(|e| {
                ProtocolError::Io(io::Error::new(
                    e.kind(),
                    format!("failed to set permissions on {}: {e}", path.display()),
                ))
            })
        }
        Err(e) => Err(ProtocolError::Io(io::Error::new(
            e.kind(),
            format!("failed to stat {}: {e}", path.display()),
        ))),
    }
}

/// Remove a stale socket file, refusing paths that are not sockets.
fn cleanup_socket_file(path: &Path) -> ProtocolResult<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(ProtocolError::Io(io::Error::new(
                e.kind(),
                format!("failed to stat {}: {e}", path.display()),
            )))
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(ProtocolError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("path {} exists but is not a socket", path.display()),
        )));
    }

    std::fs::remove_file(path).map_err(|e| {
        ProtocolError::Io(io::Error::new(
            e.kind(),
            format!("failed to remove stale socket {}: {e}", path.display()),
        ))
    })?;
    debug!(path = %path.display(), "removed stale socket file");
    Ok(())
}

fn set_socket_permissions(path: &Path, mode: u32) -> ProtocolResult<()> {
    let perms = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, perms).map_err(|e| {
        ProtocolError::Io(io::Error::new(
            e.kind(),
            format!("failed to set socket permissions on {}: {e}", path.display()),
        ))
    })
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "failed to remove event socket {}: {e}",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;
    use tokio_util::codec::Framed;

    use super::*;

    /// Records pushes; refuses sp_ids above a threshold.
    struct RecordingHandler {
        seen: Mutex<Vec<(u64, u8, bool)>>,
        refuse_above: u64,
    }

    impl RecordingHandler {
        fn new(refuse_above: u64) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                refuse_above,
            })
        }
    }

    impl EventHandler for RecordingHandler {
        fn esp_sa_expired(&self, sp_id: u64, protocol: u8, soft: bool) -> Result<(), String> {
            if sp_id > self.refuse_above {
                return Err(format!("unknown association {sp_id}"));
            }
            self.seen.lock().unwrap().push((sp_id, protocol, soft));
            Ok(())
        }
    }

    async fn push(
        framed: &mut Framed<UnixStream, FrameCodec>,
        request: &EventRequest,
    ) -> EventResponse {
        framed.send(encode_message(request).unwrap()).await.unwrap();
        let frame = framed.next().await.unwrap().unwrap();
        decode_message(&frame).unwrap()
    }

    #[tokio::test]
    async fn bind_serve_push_ack() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tkm.rpc.ees");
        let handler = RecordingHandler::new(u64::MAX);
        let handle = EventListener::bind(&path)
            .unwrap()
            .serve(Arc::clone(&handler) as Arc<dyn EventHandler>);

        let stream = UnixStream::connect(&path).await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());
        let response = push(
            &mut framed,
            &EventRequest::EspSaExpired {
                sp_id: 7,
                protocol: 50,
                soft: true,
            },
        )
        .await;
        assert_eq!(response, EventResponse::Ack);
        assert_eq!(*handler.seen.lock().unwrap(), vec![(7, 50, true)]);

        handle.shutdown().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn refused_push_gets_error_reply() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tkm.rpc.ees");
        let handler = RecordingHandler::new(10);
        let handle = EventListener::bind(&path)
            .unwrap()
            .serve(handler as Arc<dyn EventHandler>);

        let stream = UnixStream::connect(&path).await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());
        let response = push(
            &mut framed,
            &EventRequest::EspSaExpired {
                sp_id: 99,
                protocol: 50,
                soft: false,
            },
        )
        .await;
        assert!(matches!(response, EventResponse::Error { .. }));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn garbage_frame_drops_the_connection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tkm.rpc.ees");
        let handle = EventListener::bind(&path)
            .unwrap()
            .serve(RecordingHandler::new(0) as Arc<dyn EventHandler>);

        let stream = UnixStream::connect(&path).await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());
        framed
            .send(bytes::Bytes::from_static(b"not a message"))
            .await
            .unwrap();
        // The listener closes its side rather than answering garbage.
        assert!(framed.next().await.is_none());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tkm.rpc.ees");
        {
            let first = EventListener::bind(&path).unwrap();
            // Simulate an unclean exit: the socket file stays behind.
            std::mem::forget(first);
        }
        assert!(path.exists());
        let second = EventListener::bind(&path).unwrap();
        assert_eq!(second.path(), path);
    }

    #[tokio::test]
    async fn non_socket_path_is_refused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tkm.rpc.ees");
        std::fs::write(&path, b"not a socket").unwrap();
        let err = EventListener::bind(&path).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
        // The imposter file is left in place.
        assert!(path.exists());
    }

    #[tokio::test]
    async fn symlink_parent_is_refused() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let err = EventListener::bind(&link.join("tkm.rpc.ees")).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[tokio::test]
    async fn socket_mode_is_0600() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tkm.rpc.ees");
        let _listener = EventListener::bind(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, EVENT_SOCKET_MODE, "expected 0600, got {mode:04o}");
    }

    #[tokio::test]
    async fn missing_parent_directory_is_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tkm");
        let path = dir.join("tkm.rpc.ees");
        let _listener = EventListener::bind(&path).unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, DIRECTORY_MODE, "expected 0700, got {mode:04o}");
    }
}
