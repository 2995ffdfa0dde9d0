//! Owned live-update subscription.
//!
//! # Data Flow
//! ```text
//! subscribe()
//!     → driver task: channel.open()
//!         → Open: every message → mpsc → single consumer (arrival order)
//!         → error / end of stream: channel dropped
//!         → consumer dropped its receiver: channel dropped, Closed
//!     → Erroring → Polling: FallbackPoller runs inside the same task
//! dispose() / Drop
//!     → liveness flag cleared, state Closed, driver task aborted
//! ```
//!
//! Because the channel and the timer both live inside the one driver task,
//! there is never more than one of each, and aborting the task releases both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::live::channel::EventChannel;
use crate::live::poller::{FallbackAction, FallbackPoller};
use crate::live::sse::StreamMessage;
use crate::live::state::{ConnectionState, StateCell};
use crate::observability::metrics;

/// A live channel plus its fallback timer, released together on dispose.
pub struct StreamSubscription {
    target: Url,
    state: StateCell,
    live: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
}

impl StreamSubscription {
    /// Open `channel` and start delivering its messages.
    ///
    /// Returns the subscription handle and the receiving end of the message
    /// queue. If the channel fails, `fallback` (when given) runs every
    /// `poll_interval` until the subscription is disposed.
    pub fn subscribe<C: EventChannel>(
        channel: C,
        fallback: Option<FallbackAction>,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<StreamMessage>) {
        let target = channel.target().clone();
        let state = StateCell::new();
        let live = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();

        state.transition(ConnectionState::Connecting);
        tracing::info!(target = %target, "Subscribing to live stream");

        let driver = tokio::spawn(drive(
            channel,
            tx,
            state.clone(),
            live.clone(),
            fallback,
            poll_interval,
        ));

        let subscription = Self {
            target,
            state,
            live,
            driver: Some(driver),
        };
        (subscription, rx)
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Observe connection-state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Release the channel and the timer. Idempotent; no message or fallback
    /// invocation is acted upon afterwards.
    pub fn dispose(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        self.live.store(false, Ordering::Release);
        self.state.transition(ConnectionState::Closed);
        driver.abort();
        tracing::info!(target = %self.target, "Live stream subscription disposed");
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for StreamSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSubscription")
            .field("target", &self.target.as_str())
            .field("state", &self.state())
            .finish()
    }
}

async fn drive<C: EventChannel>(
    channel: C,
    tx: mpsc::UnboundedSender<StreamMessage>,
    state: StateCell,
    live: Arc<AtomicBool>,
    fallback: Option<FallbackAction>,
    poll_interval: Duration,
) {
    let target = channel.target().clone();

    match channel.open().await {
        Ok(mut messages) => {
            if !state.transition(ConnectionState::Open) {
                return;
            }
            tracing::info!(target = %target, "Live stream connected");

            while let Some(item) = messages.next().await {
                if !live.load(Ordering::Acquire) {
                    return;
                }
                match item {
                    Ok(message) => {
                        metrics::record_stream_message();
                        if tx.send(message).is_err() {
                            tracing::debug!(target = %target, "Live stream consumer gone, closing");
                            state.transition(ConnectionState::Closed);
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target = %target, error = %e, "Live stream failed");
                        break;
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(target = %target, error = %e, "Live stream handshake failed");
        }
    }

    // The channel is gone for good; closing the queue tells the consumer.
    drop(tx);
    if !state.transition(ConnectionState::Erroring) || !state.transition(ConnectionState::Polling) {
        return;
    }

    match fallback {
        Some(action) => FallbackPoller::new(action, poll_interval, live).run().await,
        None => tracing::info!(target = %target, "Live stream down and no fallback configured"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::channel::{MessageStream, StreamError};
    use futures_util::future::BoxFuture;
    use futures_util::stream;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Channel that replays a fixed script and then stays silent.
    struct ScriptedChannel {
        target: Url,
        script: Mutex<Option<Vec<Result<StreamMessage, StreamError>>>>,
        fail_handshake: bool,
        opens: Arc<AtomicUsize>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<Result<StreamMessage, StreamError>>) -> Self {
            Self {
                target: Url::parse("http://api.test/ingest/stream").unwrap(),
                script: Mutex::new(Some(script)),
                fail_handshake: false,
                opens: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EventChannel for ScriptedChannel {
        fn target(&self) -> &Url {
            &self.target
        }

        fn open(&self) -> BoxFuture<'static, Result<MessageStream, StreamError>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().unwrap().take().unwrap_or_default();
            let fail = self.fail_handshake;
            Box::pin(async move {
                if fail {
                    return Err(StreamError::Closed);
                }
                Ok(stream::iter(script).chain(stream::pending()).boxed())
            })
        }
    }

    fn msg(data: &str) -> Result<StreamMessage, StreamError> {
        Ok(StreamMessage { event: None, id: None, data: data.to_string() })
    }

    fn counting_fallback(counter: Arc<AtomicUsize>) -> FallbackAction {
        FallbackAction::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), crate::live::poller::FallbackError>(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_order_while_open() {
        let channel = ScriptedChannel::new(vec![msg("a"), msg("b"), msg("c")]);
        let (sub, mut rx) = StreamSubscription::subscribe(channel, None, Duration::from_secs(3));

        for expected in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.unwrap().data, expected);
        }
        assert_eq!(sub.state(), ConnectionState::Open);
        assert!(sub.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_degrades_to_single_timer() {
        let polls = Arc::new(AtomicUsize::new(0));
        let channel = ScriptedChannel::new(vec![
            msg("a"),
            Err(StreamError::Closed),
            Err(StreamError::Closed),
            msg("never delivered"),
        ]);
        let opens = channel.opens.clone();
        let (sub, mut rx) = StreamSubscription::subscribe(
            channel,
            Some(counting_fallback(polls.clone())),
            Duration::from_secs(3),
        );
        let mut states = sub.watch_state();

        assert_eq!(rx.recv().await.unwrap().data, "a");
        states.wait_for(|s| *s == ConnectionState::Polling).await.unwrap();

        tokio::time::sleep(Duration::from_millis(9100)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(rx.recv().await.is_none());
        assert_eq!(sub.state(), ConnectionState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handshake_polls() {
        let polls = Arc::new(AtomicUsize::new(0));
        let mut channel = ScriptedChannel::new(vec![]);
        channel.fail_handshake = true;
        let (sub, _rx) = StreamSubscription::subscribe(
            channel,
            Some(counting_fallback(polls.clone())),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(sub.state(), ConnectionState::Polling);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_timer_and_is_terminal() {
        let polls = Arc::new(AtomicUsize::new(0));
        let channel = ScriptedChannel::new(vec![Err(StreamError::Closed)]);
        let (mut sub, _rx) = StreamSubscription::subscribe(
            channel,
            Some(counting_fallback(polls.clone())),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        sub.dispose();
        assert_eq!(sub.state(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        sub.dispose();
        assert_eq!(sub.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_channel() {
        let channel = ScriptedChannel::new(vec![msg("a")]);
        let (sub, mut rx) = StreamSubscription::subscribe(channel, None, Duration::from_secs(1));
        assert_eq!(rx.recv().await.unwrap().data, "a");

        drop(sub);
        // the driver owned the only sender
        assert!(rx.recv().await.is_none());
    }

    /// Emits a message every 10ms, forever.
    struct TickingChannel {
        target: Url,
    }

    impl EventChannel for TickingChannel {
        fn target(&self) -> &Url {
            &self.target
        }

        fn open(&self) -> BoxFuture<'static, Result<MessageStream, StreamError>> {
            Box::pin(async move {
                let ticks = stream::unfold(0u64, |n| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let message = StreamMessage { event: None, id: None, data: n.to_string() };
                    Some((Ok::<_, StreamError>(message), n + 1))
                });
                Ok(ticks.boxed())
            })
        }
    }

    /// Handshake that never completes.
    struct HangingChannel {
        target: Url,
    }

    impl EventChannel for HangingChannel {
        fn target(&self) -> &Url {
            &self.target
        }

        fn open(&self) -> BoxFuture<'static, Result<MessageStream, StreamError>> {
            Box::pin(futures_util::future::pending::<Result<MessageStream, StreamError>>())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_gone_closes_subscription() {
        let channel = TickingChannel { target: Url::parse("http://api.test/ingest/stream").unwrap() };
        let (sub, mut rx) = StreamSubscription::subscribe(channel, None, Duration::from_secs(1));

        rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(rx);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sub.state(), ConnectionState::Closed);
        assert!(!sub.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_while_connecting() {
        let polls = Arc::new(AtomicUsize::new(0));
        let channel = HangingChannel { target: Url::parse("http://api.test/ingest/stream").unwrap() };
        let (mut sub, mut rx) = StreamSubscription::subscribe(
            channel,
            Some(counting_fallback(polls.clone())),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sub.state(), ConnectionState::Connecting);

        sub.dispose();
        assert_eq!(sub.state(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(polls.load(Ordering::SeqCst), 0);
        assert!(rx.recv().await.is_none());
        assert_eq!(sub.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fallback_still_reports_polling() {
        let channel = ScriptedChannel::new(vec![Err(StreamError::Closed)]);
        let (sub, _rx) = StreamSubscription::subscribe(channel, None, Duration::from_secs(1));
        let mut states = sub.watch_state();
        states.wait_for(|s| *s == ConnectionState::Polling).await.unwrap();
        assert!(!sub.is_connected());
    }
}
