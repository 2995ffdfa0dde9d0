//! Live event channels.
//!
//! A channel is opened once per subscription. Opening resolves when the
//! handshake completes and yields a stream of messages; any `Err` item or the
//! end of the stream is terminal for that channel instance.

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use thiserror::Error;
use url::Url;

use crate::live::sse::{LineTooLong, SseDecoder, StreamMessage};

/// Errors raised by a live channel. They never leave the subscription; they
/// only drive the state machine and the logs.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The handshake request could not be sent.
    #[error("connect failed: {0}")]
    Connect(#[source] reqwest::Error),

    /// The server answered the handshake with a non-success status.
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    /// The body failed mid-stream.
    #[error("stream transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The body could not be framed as server-sent events.
    #[error("malformed event stream: {0}")]
    Framing(#[from] LineTooLong),

    /// The server ended the stream.
    #[error("stream closed by server")]
    Closed,
}

pub type MessageStream = BoxStream<'static, Result<StreamMessage, StreamError>>;

/// Something that can open a live event channel.
pub trait EventChannel: Send + Sync + 'static {
    /// The endpoint this channel connects to.
    fn target(&self) -> &Url;

    /// Perform the handshake and return the inbound message stream.
    fn open(&self) -> BoxFuture<'static, Result<MessageStream, StreamError>>;
}

/// Server-sent events over a long-lived GET.
#[derive(Debug, Clone)]
pub struct SseChannel {
    client: reqwest::Client,
    target: Url,
}

impl SseChannel {
    pub fn new(client: reqwest::Client, target: Url) -> Self {
        Self { client, target }
    }
}

impl EventChannel for SseChannel {
    fn target(&self) -> &Url {
        &self.target
    }

    fn open(&self) -> BoxFuture<'static, Result<MessageStream, StreamError>> {
        let request = self
            .client
            .get(self.target.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        Box::pin(async move {
            let response = request.send().await.map_err(StreamError::Connect)?;
            let status = response.status();
            if !status.is_success() {
                return Err(StreamError::Status(status));
            }
            Ok(decode_body(response.bytes_stream()))
        })
    }
}

/// Turn a raw body stream into SSE messages, terminated by `Closed` when the
/// body ends.
fn decode_body<S, B>(body: S) -> MessageStream
where
    S: futures_util::Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]>,
{
    let mut decoder = SseDecoder::new();
    let messages = body.flat_map(move |chunk| {
        let items: Vec<Result<StreamMessage, StreamError>> = match chunk {
            Ok(bytes) => decoder
                .feed(bytes.as_ref())
                .into_iter()
                .map(|item| item.map_err(StreamError::from))
                .collect(),
            Err(e) => vec![Err(StreamError::Transport(e))],
        };
        stream::iter(items)
    });
    messages.chain(stream::once(async { Err(StreamError::Closed) })).boxed()
}
