use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::controller::ApiResponse;
use crate::params::event::PublishParams;
use crate::{AppState, Error};
use events::{Event, Topic};
use log::*;

/// POST publish an event to every open event stream.
///
/// For mutation handlers living outside this process. In-process code
/// should call `AppState::event_publisher` directly.
#[utoipa::path(
    post,
    path = "/events/{topic}",
    params(
        ("topic" = String, Path, description = "School id the event concerns, or `*` for all")
    ),
    request_body = PublishParams,
    responses(
        (status = 202, description = "Event accepted for broadcast"),
        (status = 422, description = "Unprocessable Entity")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    Path(topic): Path<String>,
    Json(params): Json<PublishParams>,
) -> Result<impl IntoResponse, Error> {
    if topic.trim().is_empty() {
        return Err(Error::InvalidTopic(topic));
    }
    if params.event_type.trim().is_empty() {
        return Err(Error::MissingEventType);
    }

    let event = Event::new(Topic::from_path(&topic), params.event_type.as_str(), params.data);
    debug!("POST publish {} for {}", event.kind, event.topic);

    app_state.event_publisher.publish(event).await;

    let connections = app_state.sse_manager.connection_count();
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            StatusCode::ACCEPTED.into(),
            json!({ "connections": connections }),
        )),
    ))
}
