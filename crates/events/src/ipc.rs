//! Unix-domain socket transport.
//!
//! Worker processes open a [`SocketConnection`] to
//! `<sock_dir>/master_event_pull.ipc` and write one JSON-encoded
//! [`BusEvent`] per line. The [`SocketHub`] owning that socket decodes each
//! line and republishes it on an in-process [`EventBus`], where any number of
//! listeners pick it up. Lines that are not valid events, including ones that
//! are not UTF-8 or exceed the hub's line cap, are logged and dropped without
//! closing the publisher's connection.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, EventBus};
use crate::transport::{BusConfig, EventConnection, EventError, EventTransport, TransportKind};

/// Default cap on one encoded event line, newline excluded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Publisher side
// ---------------------------------------------------------------------------

/// Publish-only transport over the hub's pull socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketTransport;

impl EventTransport for SocketTransport {
    type Connection = SocketConnection;

    async fn connect(&self, config: &BusConfig, listen: bool) -> Result<SocketConnection, EventError> {
        config.expect_transport(TransportKind::Ipc)?;
        if listen {
            return Err(EventError::ListenUnsupported(TransportKind::Ipc));
        }
        let path = config.pull_socket_path();
        let stream = UnixStream::connect(&path).await?;
        tracing::trace!(path = %path.display(), "Event connection opened");
        Ok(SocketConnection { stream, path })
    }
}

/// One publisher connection to a [`SocketHub`].
#[derive(Debug)]
pub struct SocketConnection {
    stream: UnixStream,
    path: PathBuf,
}

impl EventConnection for SocketConnection {
    async fn fire_event(&mut self, data: &Value, tag: &str) -> Result<(), EventError> {
        let event = BusEvent::new(tag).with_data(data.clone());
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        tracing::debug!(tag, "Event fired");
        Ok(())
    }

    async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "Event connection shutdown failed");
        }
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), "Event connection released");
    }
}

// ---------------------------------------------------------------------------
// Hub side
// ---------------------------------------------------------------------------

/// Accepts publisher connections and forwards their events onto a bus.
///
/// The socket file is removed when the hub is dropped.
#[derive(Debug)]
pub struct SocketHub {
    listener: UnixListener,
    path: PathBuf,
    bus: Arc<EventBus>,
    max_line_bytes: usize,
}

impl SocketHub {
    /// Bind the pull socket described by `config`.
    ///
    /// Creates `sock_dir` if needed and replaces a stale socket left behind by
    /// an earlier hub. Anything at that path that is not a socket is an error.
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: &BusConfig, bus: Arc<EventBus>) -> Result<Self, EventError> {
        config.expect_transport(TransportKind::Ipc)?;
        std::fs::create_dir_all(&config.sock_dir)?;

        let path = config.pull_socket_path();
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => {
                tracing::debug!(path = %path.display(), "Removing stale event socket");
                std::fs::remove_file(&path)?;
            }
            Ok(_) => return Err(EventError::invalid_socket(&path, "exists and is not a socket")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path)?;
        tracing::info!(path = %path.display(), "Event hub listening");
        Ok(Self {
            listener,
            path,
            bus,
            max_line_bytes: MAX_LINE_BYTES,
        })
    }

    /// Drop event lines longer than `max` bytes instead of [`MAX_LINE_BYTES`].
    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept publishers until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event hub shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(forward(
                            stream,
                            Arc::clone(&self.bus),
                            self.max_line_bytes,
                            cancel.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept event publisher");
                        if !pause_unless_cancelled(&cancel, ACCEPT_BACKOFF).await {
                            tracing::info!("Event hub shutting down");
                            break;
                        }
                    }
                },
            }
        }
    }
}

impl Drop for SocketHub {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(error = %e, path = %self.path.display(), "Failed to remove event socket");
        }
    }
}

/// Sleep for `delay`. Returns `false` if `cancel` fired first.
async fn pause_unless_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Relay every line from one publisher onto the bus until it disconnects.
async fn forward(
    stream: UnixStream,
    bus: Arc<EventBus>,
    max_line_bytes: usize,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = read_line_capped(&mut reader, &mut line, max_line_bytes) => match read {
                Ok(LineRead::Line) if line.trim_ascii().is_empty() => {}
                Ok(LineRead::Line) => match serde_json::from_slice::<BusEvent>(&line) {
                    Ok(event) => bus.publish(event),
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding malformed event line");
                    }
                },
                Ok(LineRead::Oversized) => {
                    tracing::warn!(max_line_bytes, "Discarding oversized event line");
                }
                Ok(LineRead::Eof) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Event publisher read failed");
                    break;
                }
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// `line` holds the next line, newline stripped.
    Line,
    /// The line ran past the cap and was thrown away.
    Oversized,
    Eof,
}

/// Read up to the next `\n` into `line`, buffering at most `max` bytes.
///
/// Bytes past the cap are consumed and discarded so the following line
/// starts clean. A final line without a trailing newline still counts.
async fn read_line_capped<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max: usize,
) -> io::Result<LineRead> {
    line.clear();
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (oversized, line.is_empty()) {
                (true, _) => LineRead::Oversized,
                (false, true) => LineRead::Eof,
                (false, false) => LineRead::Line,
            });
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = match newline {
            Some(end) => &available[..end],
            None => available,
        };
        if !oversized {
            if line.len() + chunk.len() > max {
                oversized = true;
                line.clear();
            } else {
                line.extend_from_slice(chunk);
            }
        }

        let used = newline.map_or(available.len(), |end| end + 1);
        reader.consume(used);
        if newline.is_some() {
            return Ok(if oversized { LineRead::Oversized } else { LineRead::Line });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn ipc_config(dir: &tempfile::TempDir) -> BusConfig {
        BusConfig::new(dir.path(), TransportKind::Ipc)
    }

    #[tokio::test]
    async fn events_flow_from_publisher_to_bus() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ipc_config(&dir);
        let bus = Arc::new(EventBus::default());
        let mut listener = bus.listen("salt/job/7");

        let hub = SocketHub::bind(&config, Arc::clone(&bus)).expect("bind");
        let cancel = CancellationToken::new();
        let hub_task = tokio::spawn(hub.run(cancel.clone()));

        let mut conn = SocketTransport.connect(&config, false).await.expect("connect");
        conn.fire_event(&json!({"jid": "7"}), "salt/job/7/new")
            .await
            .expect("fire new");
        conn.fire_event(&json!({"jid": "7", "success": true}), "salt/job/7/ret")
            .await
            .expect("fire ret");
        conn.close().await;

        let first = tokio::time::timeout(WAIT, listener.next())
            .await
            .expect("timely")
            .expect("event");
        let second = tokio::time::timeout(WAIT, listener.next())
            .await
            .expect("timely")
            .expect("event");
        assert_eq!(first.tag, "salt/job/7/new");
        assert_eq!(second.tag, "salt/job/7/ret");
        assert_eq!(second.data["success"], true);

        cancel.cancel();
        hub_task.await.expect("hub task");
        assert!(!config.pull_socket_path().exists());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ipc_config(&dir);
        let bus = Arc::new(EventBus::default());
        let mut listener = bus.listen("");

        let hub = SocketHub::bind(&config, Arc::clone(&bus)).expect("bind");
        let cancel = CancellationToken::new();
        tokio::spawn(hub.run(cancel.clone()));

        let mut raw = UnixStream::connect(config.pull_socket_path())
            .await
            .expect("connect");
        raw.write_all(b"not json\n\n").await.expect("write");
        let good = serde_json::to_string(&BusEvent::new("ok")).expect("encode");
        raw.write_all(format!("{good}\n").as_bytes())
            .await
            .expect("write");

        let event = tokio::time::timeout(WAIT, listener.next())
            .await
            .expect("timely")
            .expect("event");
        assert_eq!(event.tag, "ok");
        cancel.cancel();
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ipc_config(&dir);
        let bus = Arc::new(EventBus::default());
        let mut listener = bus.listen("");

        let hub = SocketHub::bind(&config, Arc::clone(&bus)).expect("bind");
        let cancel = CancellationToken::new();
        tokio::spawn(hub.run(cancel.clone()));

        let mut raw = UnixStream::connect(config.pull_socket_path())
            .await
            .expect("connect");
        raw.write_all(b"\xff\xfe garbage\n").await.expect("write");
        let good = serde_json::to_string(&BusEvent::new("ok")).expect("encode");
        raw.write_all(format!("{good}\n").as_bytes())
            .await
            .expect("write");

        let event = tokio::time::timeout(WAIT, listener.next())
            .await
            .expect("timely")
            .expect("event");
        assert_eq!(event.tag, "ok");
        cancel.cancel();
    }

    #[tokio::test]
    async fn oversized_line_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ipc_config(&dir);
        let bus = Arc::new(EventBus::default());
        let mut listener = bus.listen("");

        let hub = SocketHub::bind(&config, Arc::clone(&bus))
            .expect("bind")
            .with_max_line_bytes(64);
        let cancel = CancellationToken::new();
        tokio::spawn(hub.run(cancel.clone()));

        let mut raw = UnixStream::connect(config.pull_socket_path())
            .await
            .expect("connect");
        let huge = serde_json::to_string(&BusEvent::new("x".repeat(4096))).expect("encode");
        raw.write_all(format!("{huge}\n").as_bytes())
            .await
            .expect("write");
        let good = serde_json::to_string(&BusEvent::new("ok")).expect("encode");
        raw.write_all(format!("{good}\n").as_bytes())
            .await
            .expect("write");

        let event = tokio::time::timeout(WAIT, listener.next())
            .await
            .expect("timely")
            .expect("event");
        assert_eq!(event.tag, "ok");
        cancel.cancel();
    }

    #[tokio::test]
    async fn capped_reader_splits_and_discards() {
        let input: &[u8] = b"short\n0123456789abcdef\n\xff\ntail";
        let mut reader = BufReader::with_capacity(4, input);
        let mut line = Vec::new();

        assert_eq!(
            read_line_capped(&mut reader, &mut line, 8).await.unwrap(),
            LineRead::Line
        );
        assert_eq!(line, b"short");
        assert_eq!(
            read_line_capped(&mut reader, &mut line, 8).await.unwrap(),
            LineRead::Oversized
        );
        assert_eq!(
            read_line_capped(&mut reader, &mut line, 8).await.unwrap(),
            LineRead::Line
        );
        assert_eq!(line, b"\xff");
        assert_eq!(
            read_line_capped(&mut reader, &mut line, 8).await.unwrap(),
            LineRead::Line
        );
        assert_eq!(line, b"tail");
        assert_eq!(
            read_line_capped(&mut reader, &mut line, 8).await.unwrap(),
            LineRead::Eof
        );
    }

    #[tokio::test]
    async fn accept_backoff_stops_on_cancel() {
        let cancel = CancellationToken::new();
        assert!(pause_unless_cancelled(&cancel, Duration::from_millis(1)).await);

        cancel.cancel();
        let paused = tokio::time::timeout(
            WAIT,
            pause_unless_cancelled(&cancel, Duration::from_secs(3600)),
        )
        .await
        .expect("cancelled pause returns promptly");
        assert!(!paused);
    }

    #[tokio::test]
    async fn connect_without_hub_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = SocketTransport.connect(&ipc_config(&dir), false).await;
        assert_matches!(result, Err(EventError::Io(_)));
    }

    #[tokio::test]
    async fn socket_transport_is_publish_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = SocketTransport.connect(&ipc_config(&dir), true).await;
        assert_matches!(result, Err(EventError::ListenUnsupported(TransportKind::Ipc)));
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ipc_config(&dir);
        let bus = Arc::new(EventBus::default());

        let first = SocketHub::bind(&config, Arc::clone(&bus)).expect("first bind");
        // Leak the socket file as a crashed hub would.
        std::mem::forget(first);
        assert!(config.pull_socket_path().exists());

        let second = SocketHub::bind(&config, bus).expect("second bind");
        assert_eq!(second.path(), config.pull_socket_path());
    }

    #[tokio::test]
    async fn bind_refuses_to_clobber_regular_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ipc_config(&dir);
        std::fs::write(config.pull_socket_path(), b"keep me").expect("write");

        let result = SocketHub::bind(&config, Arc::new(EventBus::default()));
        assert_matches!(result, Err(EventError::InvalidSocket { .. }));
    }
}
