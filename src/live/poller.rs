//! Fallback polling once the live channel has failed.
//!
//! # Responsibilities
//! - Invoke the fallback action once per fixed period
//! - Never block the timer on a slow or failing action
//! - Stop acting as soon as the owning subscription is disposed

use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;

pub type FallbackError = Box<dyn StdError + Send + Sync>;

/// Application logic run on every poll tick (a re-fetch, a synthetic
/// heartbeat, ...). Cloning shares the same action.
#[derive(Clone)]
pub struct FallbackAction {
    inner: Arc<dyn Fn() -> BoxFuture<'static, Result<(), FallbackError>> + Send + Sync>,
}

impl FallbackAction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FallbackError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move || Box::pin(f()) as BoxFuture<'static, _>),
        }
    }

    pub(crate) fn invoke(&self) -> BoxFuture<'static, Result<(), FallbackError>> {
        (self.inner)()
    }
}

impl std::fmt::Debug for FallbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackAction").finish_non_exhaustive()
    }
}

/// Recurring timer that drives a [`FallbackAction`].
pub struct FallbackPoller {
    action: FallbackAction,
    period: Duration,
    live: Arc<AtomicBool>,
}

impl FallbackPoller {
    pub fn new(action: FallbackAction, period: Duration, live: Arc<AtomicBool>) -> Self {
        Self { action, period, live }
    }

    /// Tick until the liveness flag drops. The first tick fires one period
    /// after start.
    ///
    /// Invocations run as separate tasks owned by this future: they may
    /// overlap, and dropping the future aborts any still running.
    pub async fn run(self) {
        tracing::info!(period_ms = self.period.as_millis() as u64, "Fallback polling started");

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        loop {
            ticker.tick().await;
            if !self.live.load(Ordering::Acquire) {
                break;
            }

            while in_flight.try_join_next().is_some() {}

            let call = self.action.invoke();
            let live = self.live.clone();
            in_flight.spawn(async move {
                let result = call.await;
                if !live.load(Ordering::Acquire) {
                    return;
                }
                match result {
                    Ok(()) => metrics::record_poll_tick(true),
                    Err(e) => {
                        metrics::record_poll_tick(false);
                        tracing::debug!(error = %e, "Fallback action failed");
                    }
                }
            });
        }

        tracing::debug!("Fallback polling stopped");
    }
}
