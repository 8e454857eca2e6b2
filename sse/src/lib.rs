//! Server-Sent Events (SSE) broadcast hub for live photo-gallery updates.
//!
//! # Architecture
//!
//! - **One registry of open streams**: every client that opens the event
//!   stream gets a server-generated `ConnectionId` and an entry in the
//!   `ConnectionRegistry`.
//! - **Broadcast only**: every event goes to every connection. Clients filter
//!   by school id on their side.
//! - **Ephemeral messages**: events are never stored. A client that is
//!   offline when an event fires misses it and sees fresh data on its next
//!   full load.
//! - **Eviction on write failure**: a connection whose write fails is removed
//!   during the broadcast that discovered it; the other connections still get
//!   the frame.
//!
//! # Message Flow
//!
//! 1. Client opens `GET /events`
//! 2. The web layer creates an unbounded channel and calls
//!    `Manager::accept_connection`, which registers it and sends the
//!    `connected` handshake
//! 3. A mutation handler persists a photo and publishes an `events::Event`
//! 4. `HubEventHandler` forwards it to `Manager::broadcast_event`
//! 5. The frame is serialized once and written to every channel
//! 6. When the client goes away the web layer unregisters the connection
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry and type-safe ConnectionId
//! - `manager`: accept / broadcast / connection_count
//! - `hub_event_handler`: bridge from `events::EventPublisher` to the hub

pub mod connection;
pub mod hub_event_handler;
pub mod manager;

pub use connection::{ConnectionId, FrameSender, OutboundFrame};
pub use hub_event_handler::HubEventHandler;
pub use manager::Manager;
