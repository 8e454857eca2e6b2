use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Body of a publish request: what happened and the summary the UI needs
/// to patch its view without refetching.
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct PublishParams {
    /// Event type tag, e.g. `photo_added` or `warden_photo_status_updated`.
    #[serde(rename = "type")]
    #[schema(example = "photo_added")]
    pub(crate) event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub(crate) data: Value,
}
