//! Client side of the photo-update event stream.
//!
//! One `StreamConsumer` per process owns the single streaming connection to
//! the hub, reconnects with exponential backoff when it drops, and hands
//! every incoming event to the listeners registered for its school id and to
//! the wildcard listeners. `TopicWatch` wraps a subscription as observable
//! state for UI code; `TopicFeed` queues every event for a topic.
//!
//! ```rust,ignore
//! let consumer = StreamConsumer::new(ConsumerConfig::new("http://localhost:4000"));
//!
//! let listener = Listener::new(|event| println!("{} for {}", event.kind, event.topic));
//! let subscription = consumer.subscribe(Topic::entity("school-42"), &listener);
//!
//! // later
//! subscription.unsubscribe();
//! ```
//!
//! Events are not replayed: anything broadcast while this process was
//! disconnected is missed.

pub mod consumer;
pub mod error;
pub mod registry;
pub mod topic_watch;
pub mod transport;

pub use consumer::{ConnectionState, ConnectionStatus, ConsumerConfig, StreamConsumer};
pub use error::Error;
pub use events::{Event, EventKind, Topic};
pub use registry::{Listener, ListenerId, SubscriberRegistry, Subscription};
pub use topic_watch::{TopicFeed, TopicWatch};
pub use transport::{EventSourceTransport, FrameStream, Transport};
