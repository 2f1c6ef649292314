//! Transport-neutral publishing interface.
//!
//! Workers publish job lifecycle events through an [`EventTransport`]. The
//! transport is picked by [`BusConfig::transport`] and the configuration is
//! passed to the worker explicitly, so nothing depends on inherited state.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File name of the socket publishers connect to inside `sock_dir`.
pub const PULL_SOCKET_NAME: &str = "master_event_pull.ipc";

/// Which transport a [`BusConfig`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Unix-domain socket under `sock_dir`, served by a [`SocketHub`](crate::ipc::SocketHub).
    Ipc,
    /// An [`EventBus`](crate::bus::EventBus) in the current process.
    Local,
}

impl TransportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipc" => Ok(Self::Ipc),
            "local" => Ok(Self::Local),
            other => Err(EventError::UnknownTransport(other.to_string())),
        }
    }
}

/// Where and how to reach the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub sock_dir: PathBuf,
    pub transport: TransportKind,
}

impl BusConfig {
    pub fn new(sock_dir: impl Into<PathBuf>, transport: TransportKind) -> Self {
        Self {
            sock_dir: sock_dir.into(),
            transport,
        }
    }

    /// Configuration for an in-process bus; `sock_dir` is unused.
    pub fn local() -> Self {
        Self::new(PathBuf::new(), TransportKind::Local)
    }

    /// Socket publishers connect to.
    pub fn pull_socket_path(&self) -> PathBuf {
        self.sock_dir.join(PULL_SOCKET_NAME)
    }

    pub(crate) fn expect_transport(&self, expected: TransportKind) -> Result<(), EventError> {
        if self.transport == expected {
            Ok(())
        } else {
            Err(EventError::TransportMismatch {
                expected,
                actual: self.transport,
            })
        }
    }
}

/// Errors raised while connecting to or publishing on the bus.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown event transport: {0}")]
    UnknownTransport(String),

    #[error("Transport {expected} cannot serve a {actual} bus configuration")]
    TransportMismatch {
        expected: TransportKind,
        actual: TransportKind,
    },

    #[error("The {0} transport is publish-only")]
    ListenUnsupported(TransportKind),

    #[error("Socket path {} is not usable: {reason}", path.display())]
    InvalidSocket { path: PathBuf, reason: String },
}

impl EventError {
    pub(crate) fn invalid_socket(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidSocket {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Opens bus connections.
pub trait EventTransport: Send + Sync {
    type Connection: EventConnection;

    /// Open a connection. `listen = false` asks for a send-only connection;
    /// publish-only transports answer `listen = true` with
    /// [`EventError::ListenUnsupported`].
    fn connect(
        &self,
        config: &BusConfig,
        listen: bool,
    ) -> impl Future<Output = Result<Self::Connection, EventError>> + Send;
}

/// An open bus connection. Dropping it releases the underlying resources;
/// [`close`](EventConnection::close) does the same and flushes first.
pub trait EventConnection: Send {
    /// Publish `data` under `tag`. Delivery is not acknowledged.
    fn fire_event(
        &mut self,
        data: &Value,
        tag: &str,
    ) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn transport_kind_parses_known_names() {
        assert_eq!("ipc".parse::<TransportKind>().unwrap(), TransportKind::Ipc);
        assert_eq!("local".parse::<TransportKind>().unwrap(), TransportKind::Local);
        assert_matches!(
            "zeromq".parse::<TransportKind>(),
            Err(EventError::UnknownTransport(name)) if name == "zeromq"
        );
    }

    #[test]
    fn pull_socket_lives_in_sock_dir() {
        let config = BusConfig::new("/var/run/relay", TransportKind::Ipc);
        assert_eq!(
            config.pull_socket_path(),
            PathBuf::from("/var/run/relay/master_event_pull.ipc")
        );
    }

    #[test]
    fn bus_config_serializes_transport_lowercase() {
        let config = BusConfig::new("/tmp/s", TransportKind::Ipc);
        let wire = serde_json::to_value(&config).unwrap();
        assert_eq!(wire, serde_json::json!({"sock_dir": "/tmp/s", "transport": "ipc"}));
    }

    #[test]
    fn expect_transport_reports_mismatch() {
        let err = BusConfig::local()
            .expect_transport(TransportKind::Ipc)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transport ipc cannot serve a local bus configuration"
        );
    }
}
