//! Worker configuration loaded from the environment.

use std::path::PathBuf;

use relay_core::job::UnknownClientKind;
use relay_core::ClientKind;
use relay_events::{BusConfig, EventError, TransportKind};

/// Default directory holding the event bus sockets.
pub const DEFAULT_SOCK_DIR: &str = "/var/run/relay";

/// Errors raised for invalid environment values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    Transport {
        var: &'static str,
        #[source]
        source: EventError,
    },

    #[error("{var}: {source}")]
    Client {
        var: &'static str,
        #[source]
        source: UnknownClientKind,
    },

    #[error("{var} must be a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("Cannot locate the worker executable: {0}")]
    WorkerBin(#[source] std::io::Error),
}

/// Dispatcher and worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub sock_dir: PathBuf,
    pub transport: TransportKind,
    pub client: ClientKind,
    /// Explicit tag prefix; the client's default applies when unset.
    pub tag_prefix: Option<String>,
    pub unique_jid: bool,
    /// Program launched for process-isolated jobs.
    pub worker_bin: PathBuf,
}

impl RelayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default              |
    /// |--------------------|----------------------|
    /// | `RELAY_SOCK_DIR`   | `/var/run/relay`     |
    /// | `RELAY_TRANSPORT`  | `ipc`                |
    /// | `RELAY_CLIENT`     | `runner`             |
    /// | `RELAY_TAG_PREFIX` | client default       |
    /// | `RELAY_UNIQUE_JID` | `false`              |
    /// | `RELAY_WORKER_BIN` | current executable   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sock_dir = lookup("RELAY_SOCK_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCK_DIR));

        let transport = match lookup("RELAY_TRANSPORT") {
            Some(v) => v.trim().parse().map_err(|source| ConfigError::Transport {
                var: "RELAY_TRANSPORT",
                source,
            })?,
            None => TransportKind::Ipc,
        };

        let client = match lookup("RELAY_CLIENT") {
            Some(v) => v.trim().parse().map_err(|source| ConfigError::Client {
                var: "RELAY_CLIENT",
                source,
            })?,
            None => ClientKind::Runner,
        };

        let tag_prefix = lookup("RELAY_TAG_PREFIX").filter(|v| !v.is_empty());

        let unique_jid = match lookup("RELAY_UNIQUE_JID") {
            Some(v) => parse_bool("RELAY_UNIQUE_JID", &v)?,
            None => false,
        };

        let worker_bin = match lookup("RELAY_WORKER_BIN").filter(|v| !v.is_empty()) {
            Some(v) => PathBuf::from(v),
            None => std::env::current_exe().map_err(ConfigError::WorkerBin)?,
        };

        Ok(Self {
            sock_dir,
            transport,
            client,
            tag_prefix,
            unique_jid,
            worker_bin,
        })
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig::new(self.sock_dir.clone(), self.transport)
    }

    /// Prefix placed between `salt` and the jid in job tags.
    pub fn tag_prefix(&self) -> &str {
        self.tag_prefix
            .as_deref()
            .unwrap_or_else(|| self.client.default_tag_prefix())
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
