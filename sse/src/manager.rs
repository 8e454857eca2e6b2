use crate::connection::{ConnectionId, ConnectionRegistry, FrameSender, OutboundFrame};
use events::{Event, EventKind, Frame, Topic};
use log::*;
use serde_json::Value;
use std::sync::Arc;

/// The broadcast hub. Owns every open event-stream connection and fans
/// events out to all of them.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Register a new connection and greet it with a `connected` frame
    /// carrying its own id. Only this connection receives the handshake.
    ///
    /// If the client is already gone the connection is dropped again right
    /// away; the returned id is then simply no longer registered.
    pub fn accept_connection(&self, sender: FrameSender) -> ConnectionId {
        let connection_id = self.registry.register(sender);
        info!(
            "Registered new SSE connection {} ({} open)",
            connection_id.as_str(),
            self.registry.len()
        );

        let handshake = match Frame::connected(connection_id.as_str()).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize SSE handshake: {e}");
                return connection_id;
            }
        };

        if let Err(e) = self.registry.send_to(&connection_id, Arc::from(handshake)) {
            warn!("Client left before handshake: {e}");
            self.registry.unregister(&connection_id);
        }

        connection_id
    }

    /// Unregister a connection by ID. Safe to call more than once.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.registry.unregister(connection_id) {
            info!(
                "Unregistered SSE connection {} ({} open)",
                connection_id.as_str(),
                self.registry.len()
            );
        }
    }

    /// Build an event stamped now and write it to every open connection.
    pub fn broadcast(&self, topic: Topic, kind: impl Into<EventKind>, data: Value) {
        self.broadcast_event(&Event::new(topic, kind, data));
    }

    /// Fire-and-forget fan-out of an already built event. Connections whose
    /// write fails are evicted; nothing is reported to the caller.
    pub fn broadcast_event(&self, event: &Event) {
        let frame: OutboundFrame = match Frame::Update(event.clone()).to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!("Failed to serialize SSE event: {e}");
                return;
            }
        };

        let evicted = self.registry.broadcast(frame);

        debug!(
            "Broadcast {} for {} to {} connection(s), evicted {}",
            event.kind,
            event.topic,
            self.registry.len(),
            evicted.len()
        );
    }

    /// Number of open connections. Diagnostics only.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.registry.contains(connection_id)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn decode(frame: OutboundFrame) -> Frame {
        Frame::decode(&frame).unwrap()
    }

    fn accept(manager: &Manager) -> (ConnectionId, UnboundedReceiver<OutboundFrame>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = manager.accept_connection(tx);
        // Drain the handshake so tests only see broadcasts.
        assert!(matches!(
            decode(rx.try_recv().unwrap()),
            Frame::Connected { .. }
        ));
        (id, rx)
    }

    #[test]
    fn accept_sends_handshake_with_own_id_to_that_connection_only() {
        let manager = Manager::new();
        let (_first, mut first_rx) = accept(&manager);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = manager.accept_connection(tx);

        match decode(rx.try_recv().unwrap()) {
            Frame::Connected { client_id, .. } => assert_eq!(client_id, id.as_str()),
            other => panic!("expected handshake, got {other:?}"),
        }
        assert!(first_rx.try_recv().is_err());
        assert_eq!(manager.connection_count(), 2);
    }

    #[test]
    fn accept_of_an_already_closed_client_does_not_register() {
        let manager = Manager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let id = manager.accept_connection(tx);

        assert!(!manager.is_connected(&id));
        assert_eq!(manager.connection_count(), 0);
        // Cleanup path may still run later; double removal is harmless.
        manager.unregister_connection(&id);
    }

    #[test]
    fn broadcast_delivers_one_frame_to_every_connection() {
        let manager = Manager::new();
        let mut receivers: Vec<_> = (0..4).map(|_| accept(&manager).1).collect();

        manager.broadcast(Topic::entity("school-42"), "photo_added", json!({"id": "p1"}));

        for rx in receivers.iter_mut() {
            match decode(rx.try_recv().unwrap()) {
                Frame::Update(event) => {
                    assert_eq!(event.kind, EventKind::PhotoAdded);
                    assert_eq!(event.topic, Topic::entity("school-42"));
                    assert_eq!(event.data, json!({"id": "p1"}));
                }
                other => panic!("expected update, got {other:?}"),
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn broadcast_frame_has_the_expected_wire_shape() {
        let manager = Manager::new();
        let (_id, mut rx) = accept(&manager);

        manager.broadcast(Topic::entity("school-42"), "photo_added", json!({"id": "p1"}));

        let body: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(body["type"], "photo_added");
        assert_eq!(body["schoolId"], "school-42");
        assert_eq!(body["data"], json!({"id": "p1"}));
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn failing_connection_is_evicted_without_blocking_the_others() {
        let manager = Manager::new();
        let (id1, mut rx1) = accept(&manager);
        let (id2, rx2) = accept(&manager);
        let (id3, mut rx3) = accept(&manager);
        drop(rx2);

        manager.broadcast(Topic::entity("school-1"), "photo_deleted", json!({"id": "p9"}));

        assert!(rx1.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
        assert!(manager.is_connected(&id1));
        assert!(!manager.is_connected(&id2));
        assert!(manager.is_connected(&id3));
        assert_eq!(manager.connection_count(), 2);

        manager.broadcast(Topic::entity("school-1"), "photo_added", json!({"id": "p10"}));
        assert!(rx1.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
    }

    #[test]
    fn eviction_leaves_only_the_healthy_connection() {
        let manager = Manager::new();
        let (c1, _rx1) = accept(&manager);
        let (c2, rx2) = accept(&manager);
        drop(rx2);

        manager.broadcast(Topic::All, "photos_refreshed", json!({}));

        assert_eq!(manager.connection_count(), 1);
        assert!(manager.is_connected(&c1));
        assert!(!manager.is_connected(&c2));
    }

    #[test]
    fn frames_arrive_in_broadcast_order() {
        let manager = Manager::new();
        let (_id, mut rx) = accept(&manager);

        for n in 0..5 {
            manager.broadcast(Topic::entity("school-1"), "photo_added", json!({ "n": n }));
        }

        for n in 0..5 {
            match decode(rx.try_recv().unwrap()) {
                Frame::Update(event) => assert_eq!(event.data, json!({ "n": n })),
                other => panic!("expected update, got {other:?}"),
            }
        }
    }
}
