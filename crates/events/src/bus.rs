//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`BusEvent`]s. It is
//! designed to be shared via `Arc<EventBus>`: the [`SocketHub`](crate::ipc::SocketHub)
//! feeds it with events from worker processes, and [`LocalTransport`] lets
//! in-process workers publish to it directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::tag::tag_matches;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::transport::{BusConfig, EventConnection, EventError, EventTransport, TransportKind};

// ---------------------------------------------------------------------------
// BusEvent
// ---------------------------------------------------------------------------

/// One message on the bus: a tag and its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// `/`-separated topic, e.g. `"salt/job/20240101120000123456/ret"`.
    pub tag: String,

    /// Free-form JSON payload carrying event-specific data.
    pub data: Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    /// Create an event with an empty object payload.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            data: Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BusEvent`].
///
/// # Usage
///
/// ```rust
/// use relay_events::bus::{BusEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(BusEvent::new("salt/run/1/new"));
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: BusEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events whose tag is `prefix` or lies underneath it.
    pub fn listen(&self, prefix: impl Into<String>) -> EventListener {
        EventListener {
            receiver: self.subscribe(),
            prefix: prefix.into(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// EventListener
// ---------------------------------------------------------------------------

/// A tag-filtered subscription.
pub struct EventListener {
    receiver: broadcast::Receiver<BusEvent>,
    prefix: String,
}

impl EventListener {
    /// Wait for the next matching event.
    ///
    /// Returns `None` once the bus is dropped. Lagging is logged and skipped.
    pub async fn next(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if tag_matches(&event.tag, &self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        prefix = %self.prefix,
                        "Event listener lagged, some events were dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LocalTransport
// ---------------------------------------------------------------------------

/// Transport publishing straight onto an in-process [`EventBus`].
#[derive(Clone)]
pub struct LocalTransport {
    bus: Arc<EventBus>,
}

impl LocalTransport {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl EventTransport for LocalTransport {
    type Connection = LocalConnection;

    async fn connect(&self, config: &BusConfig, listen: bool) -> Result<LocalConnection, EventError> {
        config.expect_transport(TransportKind::Local)?;
        if listen {
            return Err(EventError::ListenUnsupported(TransportKind::Local));
        }
        Ok(LocalConnection {
            bus: Arc::clone(&self.bus),
        })
    }
}

/// Publish-only connection handed out by [`LocalTransport`]. Listeners
/// subscribe to the [`EventBus`] directly.
pub struct LocalConnection {
    bus: Arc<EventBus>,
}

impl EventConnection for LocalConnection {
    async fn fire_event(&mut self, data: &Value, tag: &str) -> Result<(), EventError> {
        self.bus.publish(BusEvent::new(tag).with_data(data.clone()));
        Ok(())
    }

    async fn close(self) {
        tracing::trace!("Local event connection released");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = BusEvent::new("salt/job/1/new").with_data(serde_json::json!({"jid": "1"}));

        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.tag, "salt/job/1/new");
        assert_eq!(received.data["jid"], "1");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(BusEvent::new("multi/test"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.tag, "multi/test");
        assert_eq!(e2.tag, "multi/test");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers; must not panic.
        bus.publish(BusEvent::new("orphan/event"));
    }

    #[test]
    fn default_event_has_empty_object_payload() {
        let event = BusEvent::new("bare");
        assert_eq!(event.tag, "bare");
        assert!(event.data.is_object());
    }

    #[tokio::test]
    async fn listener_skips_other_tags() {
        let bus = EventBus::default();
        let mut listener = bus.listen("salt/job/2");

        bus.publish(BusEvent::new("salt/job/1/new"));
        bus.publish(BusEvent::new("salt/job/20/new"));
        bus.publish(BusEvent::new("salt/job/2/new"));

        let event = listener.next().await.expect("matching event");
        assert_eq!(event.tag, "salt/job/2/new");
    }

    #[tokio::test]
    async fn listener_ends_when_bus_dropped() {
        let bus = EventBus::default();
        let mut listener = bus.listen("");
        drop(bus);
        let next = tokio::time::timeout(Duration::from_secs(1), listener.next())
            .await
            .expect("listener should not hang");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn local_transport_publishes_onto_bus() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let transport = LocalTransport::new(Arc::clone(&bus));

        let mut conn = transport
            .connect(&BusConfig::local(), false)
            .await
            .expect("connect");
        conn.fire_event(&serde_json::json!({"n": 1}), "salt/run/1/new")
            .await
            .expect("fire");
        conn.close().await;

        let event = rx.recv().await.expect("event");
        assert_eq!(event.tag, "salt/run/1/new");
        assert_eq!(event.data["n"], 1);
    }

    #[tokio::test]
    async fn local_transport_refuses_listening_connections() {
        let transport = LocalTransport::new(Arc::new(EventBus::default()));
        let result = transport.connect(&BusConfig::local(), true).await;
        assert!(matches!(
            result,
            Err(EventError::ListenUnsupported(TransportKind::Local))
        ));
    }

    #[tokio::test]
    async fn local_transport_rejects_ipc_config() {
        let transport = LocalTransport::new(Arc::new(EventBus::default()));
        let result = transport
            .connect(&BusConfig::new("/tmp", TransportKind::Ipc), false)
            .await;
        assert!(matches!(result, Err(EventError::TransportMismatch { .. })));
    }
}
