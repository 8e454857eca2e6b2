use async_stream::stream;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use log::*;
use service::AppState;
use ::sse::{ConnectionId, Manager};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unregisters a connection when the response stream is dropped, which is
/// what axum does once the client disconnects or the transport errors.
struct ConnectionGuard {
    manager: Arc<Manager>,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "SSE connection {} closed, cleaning up",
            self.connection_id.as_str()
        );
        self.manager.unregister_connection(&self.connection_id);
    }
}

/// SSE handler that establishes a long-lived connection for live photo updates.
/// One connection per consumer process, shared by all of its subscriptions.
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "Long-lived text/event-stream of photo update frames")
    )
)]
pub(crate) async fn sse_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let connection_id = app_state.sse_manager.accept_connection(tx);
    debug!("Establishing SSE connection {}", connection_id.as_str());

    let guard = ConnectionGuard {
        manager: app_state.sse_manager.clone(),
        connection_id,
    };

    // Frames arrive from the hub already serialized; each becomes one `data:` line.
    let stream = stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<Event, Infallible>(Event::default().data(&*frame));
        }
    };

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(app_state.config.sse_keep_alive())),
    )
}
