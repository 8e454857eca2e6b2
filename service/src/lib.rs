use config::Config;
use events::EventPublisher;
use sse::{HubEventHandler, Manager};
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// The broadcast hub holding every open event stream.
    pub sse_manager: Arc<Manager>,
    /// Mutation handlers announce persisted changes here; the hub is
    /// registered as a handler so every announcement is broadcast.
    pub event_publisher: EventPublisher,
}

impl AppState {
    pub fn new(app_config: Config) -> Self {
        let sse_manager = Arc::new(Manager::new());
        let event_publisher =
            EventPublisher::new().with_handler(Arc::new(HubEventHandler::new(sse_manager.clone())));

        Self {
            config: app_config,
            sse_manager,
            event_publisher,
        }
    }
}
