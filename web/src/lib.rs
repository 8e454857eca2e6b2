//! HTTP surface of the photo-update hub.
//!
//! Exposes the long-lived event stream at `GET /events`, an internal publish
//! endpoint used by mutation handlers running in other processes, a health
//! check and the OpenAPI document.

use axum::http::{header, HeaderValue, Method};
use log::*;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
mod error;
mod params;
pub mod router;
mod sse;

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_addr = app_state.config.listen_addr();

    let allowed_origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect();

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(AllowOrigin::list(allowed_origins));

    let listener = TcpListener::bind(&listen_addr).await?;
    info!(
        "Server starting... listening for connections on http://{listen_addr} ({} environment)",
        app_state.config.runtime_env()
    );

    axum::serve(listener, router::define_routes(app_state).layer(cors_layer)).await
}
