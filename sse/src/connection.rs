use dashmap::DashMap;
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// One serialized frame payload (the JSON object carried on the `data:` line).
/// Shared between connections so a broadcast serializes only once.
pub type OutboundFrame = Arc<str>;

/// Writable half of a client's event stream.
pub type FrameSender = UnboundedSender<OutboundFrame>;

/// Unique identifier for a connection (server-generated, never reused)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Write failure on a single connection. The receiving half is gone, which
/// means the client disconnected or its stream was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError(pub ConnectionId);

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "connection {} is closed", self.0.as_str())
    }
}

impl std::error::Error for WriteError {}

/// Registry of open event-stream connections keyed by connection id.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, FrameSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection - O(1)
    pub fn register(&self, sender: FrameSender) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.connections.insert(connection_id.clone(), sender);
        connection_id
    }

    /// Unregister a connection - O(1). Removing an absent id is a no-op;
    /// returns whether the id was still registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    /// Write a frame to one connection. Never blocks.
    pub fn send_to(
        &self,
        connection_id: &ConnectionId,
        frame: OutboundFrame,
    ) -> Result<(), WriteError> {
        let Some(sender) = self.connections.get(connection_id) else {
            return Err(WriteError(connection_id.clone()));
        };
        sender
            .send(frame)
            .map_err(|_| WriteError(connection_id.clone()))
    }

    /// Write a frame to every connection - O(n).
    ///
    /// A failed write never stops delivery to the remaining connections. Every
    /// connection that failed is evicted after the pass and returned.
    pub fn broadcast(&self, frame: OutboundFrame) -> Vec<ConnectionId> {
        let mut failed = Vec::new();

        for entry in self.connections.iter() {
            if let Err(e) = entry.value().send(frame.clone()) {
                warn!(
                    "Failed to send broadcast to connection {}: {}. Evicting connection.",
                    entry.key().as_str(),
                    e
                );
                failed.push(entry.key().clone());
            }
        }

        // Shard guards from the iteration above must be released before removal.
        for connection_id in &failed {
            self.unregister(connection_id);
        }

        failed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
