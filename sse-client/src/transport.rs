use crate::error::Error;
use async_trait::async_trait;
use eventsource_client::{self as es, Client};
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use log::*;

/// Raw frame payloads (the text after `data:`) as they arrive, in order.
/// An `Err` item or the end of the stream means the connection is gone.
pub type FrameStream = BoxStream<'static, Result<String, Error>>;

/// Opens the streaming connection to the hub.
///
/// `open` resolves once the connection is established, so the consumer can
/// tell a failed connect from a dropped stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<FrameStream, Error>;
}

/// `Transport` over HTTP `text/event-stream` using `eventsource-client`.
///
/// The library's own reconnect loop is disabled; backoff is owned by
/// `StreamConsumer`.
pub struct EventSourceTransport {
    url: String,
}

impl EventSourceTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), events::STREAM_PATH),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for EventSourceTransport {
    async fn open(&self) -> Result<FrameStream, Error> {
        debug!("Opening event stream at {}", self.url);

        let client = es::ClientBuilder::for_url(&self.url)?
            .header("Accept", "text/event-stream")?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let mut frames = client
            .stream()
            .filter_map(|item| {
                future::ready(match item {
                    Ok(es::SSE::Event(event)) => Some(Ok(event.data)),
                    // Comments are keep-alives
                    Ok(_) => None,
                    Err(e) => Some(Err(Error::from(e))),
                })
            })
            .boxed();

        // The hub greets every connection right away, so the first frame
        // doubles as proof that the connection is up.
        match frames.next().await {
            Some(Ok(first)) => Ok(stream::once(future::ready(Ok(first)))
                .chain(frames)
                .boxed()),
            Some(Err(e)) => Err(e),
            None => Err(Error::Closed),
        }
    }
}
