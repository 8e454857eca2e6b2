use crate::{
    controller::{event_controller, health_check_controller},
    params, sse, AppState,
};
use axum::{
    routing::{get, post},
    Json, Router,
};
use events::STREAM_PATH;
use utoipa::OpenApi;

// Global OpenAPI document. A path or schema only shows up in the
// rendered document if it is listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "School Photo Feed API"
        ),
        paths(
            event_controller::publish,
            health_check_controller::health_check,
            sse::handler::sse_handler,
        ),
        components(
            schemas(
                params::event::PublishParams,
            )
        ),
        tags(
            (name = "photo_feed", description = "Live photo-gallery updates for school inspections")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(event_stream_routes(app_state.clone()))
        .merge(event_publish_routes(app_state))
        .merge(health_routes())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

fn event_stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route(STREAM_PATH, get(sse::handler::sse_handler))
        .with_state(app_state)
}

fn event_publish_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events/:topic", post(event_controller::publish))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}
