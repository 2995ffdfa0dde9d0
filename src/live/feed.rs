//! Ingest event feed.
//!
//! Consumes a [`StreamSubscription`] and keeps the newest records in an
//! [`EventBuffer`]. When the stream degrades, the configured fallback feeds
//! the same buffer through its own queue, so the owner of the feed is the only
//! writer of the buffer.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::config::{ApiConfig, FallbackKind, StreamConfig};
use crate::live::buffer::{EventBuffer, EventRecord};
use crate::live::channel::{EventChannel, SseChannel};
use crate::live::poller::{FallbackAction, FallbackError};
use crate::live::sse::StreamMessage;
use crate::live::state::ConnectionState;
use crate::live::subscription::StreamSubscription;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

const FEED_GONE: &str = "event feed no longer receiving";

/// What the feed records on each poll tick after the stream failed.
#[derive(Debug, Clone)]
pub enum FeedFallback {
    /// Nothing; the feed just goes quiet.
    Disabled,
    /// A locally generated heartbeat record.
    Heartbeat,
    /// GET `url` and record the JSON body as a snapshot.
    Refetch {
        client: reqwest::Client,
        url: Url,
        timeout: Duration,
    },
}

impl FeedFallback {
    fn into_action(self, sink: mpsc::UnboundedSender<EventRecord>) -> Option<FallbackAction> {
        match self {
            FeedFallback::Disabled => None,
            FeedFallback::Heartbeat => Some(FallbackAction::new(move || {
                let sink = sink.clone();
                async move {
                    sink.send(EventRecord::heartbeat()).map_err(|_| FEED_GONE)?;
                    Ok::<(), FallbackError>(())
                }
            })),
            FeedFallback::Refetch { client, url, timeout } => Some(FallbackAction::new(move || {
                let request = client.get(url.clone()).timeout(timeout);
                let sink = sink.clone();
                async move {
                    let body: Value = request.send().await?.error_for_status()?.json().await?;
                    sink.send(EventRecord::snapshot(body)).map_err(|_| FEED_GONE)?;
                    Ok::<(), FallbackError>(())
                }
            })),
        }
    }
}

pub struct LiveFeed {
    subscription: StreamSubscription,
    messages: Option<mpsc::UnboundedReceiver<StreamMessage>>,
    fallback: Option<mpsc::UnboundedReceiver<EventRecord>>,
    buffer: EventBuffer,
}

impl LiveFeed {
    /// Subscribe to the configured SSE endpoint.
    pub fn connect(
        client: reqwest::Client,
        api: &ApiConfig,
        stream: &StreamConfig,
    ) -> Result<Self, FeedError> {
        let target = api.endpoint(&stream.path)?;
        let fallback = match (stream.fallback, &stream.refetch_path) {
            (FallbackKind::Refetch, Some(path)) => FeedFallback::Refetch {
                client: client.clone(),
                url: api.endpoint(path)?,
                timeout: Duration::from_secs(api.request_timeout_secs),
            },
            _ => FeedFallback::Heartbeat,
        };

        Ok(Self::with_channel(
            SseChannel::new(client, target),
            fallback,
            Duration::from_millis(stream.poll_interval_ms),
            stream.buffer_capacity,
        ))
    }

    /// Build a feed over any channel.
    pub fn with_channel<C: EventChannel>(
        channel: C,
        fallback: FeedFallback,
        poll_interval: Duration,
        capacity: usize,
    ) -> Self {
        let (sink, fallback_rx) = mpsc::unbounded_channel();
        let action = fallback.into_action(sink);
        let (subscription, messages) = StreamSubscription::subscribe(channel, action, poll_interval);

        Self {
            subscription,
            messages: Some(messages),
            fallback: Some(fallback_rx),
            buffer: EventBuffer::new(capacity),
        }
    }

    /// Wait for the next record, append it, and return it.
    ///
    /// Returns `None` once neither the stream nor the fallback can produce
    /// anything more (after dispose, or a failed stream with no fallback).
    pub async fn next(&mut self) -> Option<&EventRecord> {
        let record = loop {
            tokio::select! {
                biased;
                message = recv(&mut self.messages), if self.messages.is_some() => match message {
                    Some(message) => match decode(&message) {
                        Some(record) => break record,
                        None => continue,
                    },
                    None => self.messages = None,
                },
                record = recv(&mut self.fallback), if self.fallback.is_some() => match record {
                    Some(record) => break record,
                    None => self.fallback = None,
                },
                else => return None,
            }
        };

        self.buffer.push(record);
        metrics::record_buffer_len(self.buffer.len());
        self.buffer.latest()
    }

    /// Buffered records, newest first.
    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.buffer.iter()
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn state(&self) -> ConnectionState {
        self.subscription.state()
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.subscription.watch_state()
    }

    /// Tear down the subscription. Buffered records stay readable.
    pub fn dispose(&mut self) {
        self.subscription.dispose();
        self.messages = None;
        self.fallback = None;
    }
}

async fn recv<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

fn decode(message: &StreamMessage) -> Option<EventRecord> {
    match serde_json::from_str::<Value>(&message.data) {
        Ok(payload) => Some(EventRecord::from_payload(payload)),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping non-JSON stream message");
            None
        }
    }
}
