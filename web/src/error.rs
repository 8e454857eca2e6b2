use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = core::result::Result<T, Error>;

/// Errors a web request can end in. Broadcast itself never fails from the
/// caller's point of view, so only request validation shows up here.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The publish request carried an empty or blank event type.
    MissingEventType,
    /// The topic path segment was empty.
    InvalidTopic(String),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::MissingEventType => write!(fmt, "event type must not be empty"),
            Error::InvalidTopic(topic) => write!(fmt, "invalid topic: {topic:?}"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::MissingEventType | Error::InvalidTopic(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
            }
        }
    }
}
