//! Relay event bus and transports.
//!
//! This crate carries job lifecycle events from workers to listeners:
//!
//! - [`EventBus`] - in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`BusEvent`] - the `{tag, data, timestamp}` envelope.
//! - [`EventTransport`] / [`EventConnection`] - how a worker opens a bus
//!   connection and fires events on it.
//! - [`ipc`] - Unix-socket publisher and the [`SocketHub`] that feeds a bus.

pub mod bus;
#[cfg(unix)]
pub mod ipc;
pub mod transport;

pub use bus::{BusEvent, EventBus, EventListener, LocalConnection, LocalTransport};
#[cfg(unix)]
pub use ipc::{SocketConnection, SocketHub, SocketTransport};
pub use transport::{BusConfig, EventConnection, EventError, EventTransport, TransportKind};
