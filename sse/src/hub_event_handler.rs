use crate::Manager;
use async_trait::async_trait;
use events::{Event, EventHandler};
use log::*;
use std::sync::Arc;

/// Forwards every published event onto the broadcast hub.
///
/// Mutation code only talks to `events::EventPublisher`; this handler is what
/// turns "a photo was persisted" into frames on every open event stream.
pub struct HubEventHandler {
    sse_manager: Arc<Manager>,
}

impl HubEventHandler {
    pub fn new(sse_manager: Arc<Manager>) -> Self {
        Self { sse_manager }
    }
}

#[async_trait]
impl EventHandler for HubEventHandler {
    async fn handle(&self, event: &Event) {
        debug!("Handling {} event for {}", event.kind, event.topic);
        self.sse_manager.broadcast_event(event);
    }
}
