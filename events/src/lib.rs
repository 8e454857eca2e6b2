//! Event vocabulary shared by the photo-update hub and its stream consumers.
//!
//! This crate has no dependencies on the other workspace crates so both the
//! server (`sse`, `web`) and the client (`sse-client`) can speak the same
//! wire format without pulling in each other.
//!
//! # Architecture
//!
//! - **Event**: an immutable fact about one school (or about no school in
//!   particular), tagged with an `EventKind`.
//! - **Frame**: one unit pushed over the event stream, either the handshake
//!   or an `Event`. See the `frame` module for the text encoding.
//! - **EventHandler / EventPublisher**: the seam mutation code uses to announce
//!   that something was persisted. The hub registers itself as a handler.
//!
//! Payloads are carried as `serde_json::Value`; this crate never looks inside.

pub mod frame;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub use frame::{Frame, FrameError};

/// Well-known HTTP path of the long-lived event stream.
pub const STREAM_PATH: &str = "/events";

/// Path segment meaning "applies to no specific school".
pub const WILDCARD: &str = "*";

/// The entity an event or subscription is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A specific school id.
    Entity(String),
    /// Every topic. On the wire this is an event without a `schoolId`.
    All,
}

impl Topic {
    pub fn entity(id: impl Into<String>) -> Self {
        Topic::Entity(id.into())
    }

    /// Parses a path segment, mapping `*` to the wildcard.
    pub fn from_path(segment: &str) -> Self {
        if segment == WILDCARD {
            Topic::All
        } else {
            Topic::Entity(segment.to_string())
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Topic::Entity(id) => Some(id),
            Topic::All => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Topic::Entity(id) => write!(f, "{id}"),
            Topic::All => write!(f, "{WILDCARD}"),
        }
    }
}

/// What happened. Unknown wire tags are kept as `Other` so newer servers
/// can talk to older consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    PhotoAdded,
    PhotoDeleted,
    PhotosRefreshed,
    WardenPhotoAdded,
    WardenPhotoStatusUpdated,
    WardenPhotoDeleted,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PhotoAdded => "photo_added",
            EventKind::PhotoDeleted => "photo_deleted",
            EventKind::PhotosRefreshed => "photos_refreshed",
            EventKind::WardenPhotoAdded => "warden_photo_added",
            EventKind::WardenPhotoStatusUpdated => "warden_photo_status_updated",
            EventKind::WardenPhotoDeleted => "warden_photo_deleted",
            EventKind::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        match tag {
            "photo_added" => EventKind::PhotoAdded,
            "photo_deleted" => EventKind::PhotoDeleted,
            "photos_refreshed" => EventKind::PhotosRefreshed,
            "warden_photo_added" => EventKind::WardenPhotoAdded,
            "warden_photo_status_updated" => EventKind::WardenPhotoStatusUpdated,
            "warden_photo_deleted" => EventKind::WardenPhotoDeleted,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        EventKind::from(tag.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient fact to broadcast. Never stored, only sent once to whoever
/// is connected at the time.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub topic: Topic,
    /// Summary of the change, enough for a UI to patch its local view.
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(topic: Topic, kind: impl Into<EventKind>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            topic,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Trait for handling published events.
/// Implementations perform side effects like pushing to connected clients.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event);
}

/// Publishes events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    pub async fn publish(&self, event: Event) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Convenience for mutation code: build the event and publish it.
    pub async fn announce(&self, topic: Topic, kind: impl Into<EventKind>, data: Value) {
        self.publish(Event::new(topic, kind, data)).await;
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
