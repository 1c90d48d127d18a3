//! Staleness monitor.
//!
//! Readers call [`StalenessMonitor::maybe_trigger_refresh`] on every read.
//! It costs one timestamp read; when the cache is older than the threshold
//! it spawns a refresh on the runtime and returns without waiting for it.
//! Concurrent triggers collapse into one run through the orchestrator's
//! single-flight lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use hotfeed_core::models::now_ms;
use hotfeed_core::store::CacheStore;

use crate::refresh::{RefreshOutcome, Refresher};

/// True when `last_ms` is more than `threshold` older than `now_ms`.
///
/// `last_ms == 0` (never refreshed) is always stale for any realistic clock.
pub fn is_stale(now_ms: i64, last_ms: i64, threshold: Duration) -> bool {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(last_ms) > threshold_ms
}

pub struct StalenessMonitor {
    store: Arc<dyn CacheStore>,
    refresher: Arc<Refresher>,
    threshold: Duration,
}

impl StalenessMonitor {
    pub fn new(refresher: Arc<Refresher>, threshold: Duration) -> Self {
        Self {
            store: refresher.store().clone(),
            refresher,
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Check freshness and, if stale, start a refresh in the background.
    ///
    /// Returns the handle of the spawned task, or `None` when nothing was
    /// started. Callers are free to drop the handle; the task keeps running.
    pub async fn maybe_trigger_refresh(&self) -> Option<JoinHandle<()>> {
        let last = match self.store.last_refreshed().await {
            Ok(ts) => ts,
            Err(e) => {
                // unreadable timestamp: treat as never refreshed
                tracing::warn!(error = %e, "could not read last-refreshed timestamp");
                0
            }
        };

        if !is_stale(now_ms(), last, self.threshold) {
            return None;
        }
        if self.refresher.is_running() {
            tracing::debug!("cache stale but a refresh is already running");
            return None;
        }

        tracing::info!(last_refreshed = last, "cache stale; triggering refresh");
        Some(spawn_refresh(self.refresher.clone()))
    }

    /// Run [`maybe_trigger_refresh`](Self::maybe_trigger_refresh) on a fixed
    /// interval until the returned task is aborted.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let _ = self.maybe_trigger_refresh().await;
            }
        })
    }
}

/// Spawn one refresh. The run itself executes in an inner task so that a
/// panic inside it is caught at the task boundary and logged here instead
/// of reaching the caller.
fn spawn_refresh(refresher: Arc<Refresher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let run = tokio::spawn(async move { refresher.try_refresh().await });
        match run.await {
            Ok(RefreshOutcome::Completed(_)) => {}
            Ok(RefreshOutcome::Skipped) => {
                tracing::debug!("background refresh skipped; another run holds the lock")
            }
            // already logged by the orchestrator
            Ok(RefreshOutcome::Failed(_)) => {}
            Err(e) if e.is_panic() => tracing::error!(error = %e, "background refresh panicked"),
            Err(e) => tracing::error!(error = %e, "background refresh task failed"),
        }
    })
}
