//! Stream connection state machine.
//!
//! # State Transitions
//! ```text
//! Idle → Connecting: subscribe
//! Connecting → Open: handshake succeeded
//! Connecting | Open → Erroring: handshake failed, channel error or end of stream
//! Erroring → Polling: channel dropped, fallback timer started
//! any → Closed: dispose (terminal)
//! ```
//!
//! There is no way back from `Erroring`/`Polling` to `Open`; a degraded
//! subscription stays degraded for the rest of its life.

use std::fmt;

use tokio::sync::watch;

use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Connecting = 1,
    Open = 2,
    Erroring = 3,
    Polling = 4,
    Closed = 5,
}

impl ConnectionState {
    /// Whether the live channel is currently delivering.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Open
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Erroring)
                | (Open, Erroring)
                | (Erroring, Polling)
                | (Idle | Connecting | Open | Erroring | Polling, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "connected",
            ConnectionState::Erroring => "erroring",
            ConnectionState::Polling => "polling",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Publishes state transitions to any number of observers.
///
/// Illegal transitions are dropped, which is what makes `Closed` sticky even
/// when the driver races a dispose.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Idle);
        Self { tx }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply a transition. Returns false if it was not legal from the current state.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::debug!(from = %current, to = %next, "Connection state change");
                *current = next;
                applied = true;
            }
            applied
        });
        if applied {
            metrics::record_connection_state(next);
        }
        applied
    }
}
