//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the event stream endpoint.
//! The hub itself (Manager, ConnectionRegistry) lives in the `sse` crate.

pub mod handler;
