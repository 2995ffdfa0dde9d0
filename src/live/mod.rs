//! Live updates subsystem.
//!
//! # Data Flow
//! ```text
//! SSE endpoint
//!     → channel.rs (handshake, body stream)
//!     → sse.rs (framing)
//!     → subscription.rs (state machine, single-consumer queue)
//!     → feed.rs (JSON decode, buffer.rs)
//!
//! On channel failure:
//!     subscription.rs → poller.rs (fixed-period fallback action)
//!     → feed.rs (heartbeat / snapshot records)
//! ```
//!
//! # Design Decisions
//! - A failed channel is never reopened; the subscription degrades to polling
//! - Channel errors never reach the caller, only the connection state
//! - Disposal releases channel and timer together and is idempotent

pub mod buffer;
pub mod channel;
pub mod feed;
pub mod poller;
pub mod sse;
pub mod state;
pub mod subscription;

pub use buffer::{EventBuffer, EventRecord};
pub use channel::{EventChannel, SseChannel, StreamError};
pub use feed::{FeedError, FeedFallback, LiveFeed};
pub use poller::{FallbackAction, FallbackError, FallbackPoller};
pub use sse::StreamMessage;
pub use state::ConnectionState;
pub use subscription::StreamSubscription;
