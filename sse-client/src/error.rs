use std::fmt;

/// Transport-level failures of the event stream. These only ever feed the
/// reconnect state machine; subscribers never see them.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The stream could not be opened or failed mid-stream.
    Transport(String),
    /// The server ended the stream.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(msg) => write!(f, "Event stream transport error: {}", msg),
            Error::Closed => write!(f, "Event stream closed by server"),
        }
    }
}

impl std::error::Error for Error {}

impl From<eventsource_client::Error> for Error {
    fn from(err: eventsource_client::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
