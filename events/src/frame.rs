//! Text encoding of the event stream.
//!
//! Each frame is a `data: <JSON>` line followed by a blank line. The JSON
//! object looks like:
//!
//! ```text
//! { "type": "photo_added", "schoolId": "school-42", "timestamp": "2024-05-01T10:00:00Z", "data": { ... } }
//! ```
//!
//! `schoolId` is omitted for events that concern no specific school. The
//! handshake sent right after a client connects uses `"type": "connected"`
//! and carries a `clientId` instead of `schoolId`/`data`.

use crate::{Event, EventKind, Topic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;

const CONNECTED: &str = "connected";
const DATA_PREFIX: &str = "data:";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Handshake sent to a single connection when it is accepted.
    Connected {
        client_id: String,
        timestamp: DateTime<Utc>,
    },
    Update(Event),
}

#[derive(Debug)]
pub enum FrameError {
    /// The payload was not a JSON object of the expected shape.
    Json(serde_json::Error),
    /// The text block carried no `data:` line.
    MissingData,
    MissingField(&'static str),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::Json(e) => write!(f, "Invalid frame JSON: {e}"),
            FrameError::MissingData => write!(f, "Frame has no data line"),
            FrameError::MissingField(field) => write!(f, "Frame is missing field `{field}`"),
        }
    }
}

impl StdError for FrameError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            FrameError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        FrameError::Json(err)
    }
}

// Flat wire shape shared by both frame variants.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    school_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl Frame {
    pub fn connected(client_id: impl Into<String>) -> Self {
        Frame::Connected {
            client_id: client_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serializes the frame to the JSON object carried on the `data:` line.
    pub fn to_json(&self) -> Result<String, FrameError> {
        let wire = match self {
            Frame::Connected {
                client_id,
                timestamp,
            } => WireFrame {
                kind: CONNECTED.to_string(),
                school_id: None,
                client_id: Some(client_id.clone()),
                timestamp: Some(*timestamp),
                data: None,
            },
            Frame::Update(event) => WireFrame {
                kind: event.kind.as_str().to_string(),
                school_id: event.topic.entity_id().map(str::to_string),
                client_id: None,
                timestamp: Some(event.timestamp),
                data: Some(event.data.clone()),
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Produces the complete text block, terminating blank line included.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(format!("{DATA_PREFIX} {}\n\n", self.to_json()?))
    }

    /// Parses either a full `data:` text block or the bare JSON object.
    ///
    /// Multiple `data:` lines are joined with `\n`, as event-stream parsers do.
    /// Lines that are not `data:` fields (comments, `event:`, `id:`) are ignored.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let trimmed = text.trim();
        let json = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            let lines: Vec<&str> = trimmed
                .lines()
                .filter_map(|line| line.strip_prefix(DATA_PREFIX))
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                .collect();
            if lines.is_empty() {
                return Err(FrameError::MissingData);
            }
            lines.join("\n")
        };

        let wire: WireFrame = serde_json::from_str(&json)?;
        let timestamp = wire.timestamp.unwrap_or_else(Utc::now);

        if wire.kind == CONNECTED {
            let client_id = wire.client_id.ok_or(FrameError::MissingField("clientId"))?;
            return Ok(Frame::Connected {
                client_id,
                timestamp,
            });
        }

        Ok(Frame::Update(Event {
            kind: EventKind::from(wire.kind),
            topic: wire.school_id.map(Topic::Entity).unwrap_or(Topic::All),
            data: wire.data.unwrap_or(Value::Null),
            timestamp,
        }))
    }
}
