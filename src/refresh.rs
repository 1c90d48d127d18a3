//! Refresh orchestrator.
//!
//! A [`Refresher`] owns the adapter handles and performs one run:
//!
//! ```text
//! lock → migrate (advisory) → fetch hot list → for each item:
//!     reuse cached summary, or
//!     fetch thread → pace → summarize (fallback on failure)
//!   → upsert immediately
//! → delete_not_in(seen ids) → mark_refreshed → unlock
//! ```
//!
//! Runs are single-flight per `Refresher` instance: a trigger arriving while
//! a run is in progress returns [`RefreshOutcome::Skipped`] at once and is
//! not queued. The lock is an RAII guard, so it is released on every exit
//! path including a panic unwinding out of an adapter.
//!
//! Items are processed strictly one at a time. Each item is written before
//! the next is fetched, so an interrupted run leaves every item it reached
//! durably updated.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{FixedOffset, Offset, Utc};
use serde::Serialize;

use hotfeed_core::models::{format_display_time, now_ms, FeedEntry, Item};
use hotfeed_core::store::CacheStore;
use hotfeed_core::summary::{fallback_summary, format_transcript, is_fallback, NO_COMMENTS};

use crate::config::Config;
use crate::error::RefreshError;
use crate::feed::FeedSource;
use crate::summarize::Summarizer;

/// Per-run knobs, resolved once from [`Config`].
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub source_tag: String,
    pub item_delay: Duration,
    pub reuse_summaries: bool,
    pub migrate_on_run: bool,
    pub display_offset: FixedOffset,
    pub fallback_excerpt_chars: usize,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        let offset_secs = config.refresh.display_utc_offset_minutes * 60;
        Self {
            source_tag: config.feed.source_tag.clone(),
            item_delay: config.refresh.item_delay(),
            reuse_summaries: config.refresh.reuse_summaries,
            migrate_on_run: config.refresh.migrate_on_run,
            display_offset: FixedOffset::east_opt(offset_secs).unwrap_or(utc()),
            fallback_excerpt_chars: config.refresh.fallback_excerpt_chars,
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            source_tag: "V2EX".to_string(),
            item_delay: Duration::from_secs(1),
            reuse_summaries: true,
            migrate_on_run: true,
            display_offset: utc(),
            fallback_excerpt_chars: hotfeed_core::summary::DEFAULT_EXCERPT_CHARS,
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// `outer: cause: root cause`
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(cause) = cur {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        cur = cause.source();
    }
    out
}

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Entries returned by the feed, duplicates included.
    pub fetched: usize,
    /// Distinct items written to the store.
    pub processed: usize,
    /// Items whose summary came from the summarizer this run.
    pub summarized: usize,
    /// Items whose cached summary was kept.
    pub reused: usize,
    /// Items that ended up with a fallback summary.
    pub fallbacks: usize,
    /// Items whose write to the store failed. Their previous rows are kept.
    pub store_failures: usize,
    /// Cached items removed by reconciliation.
    pub removed: u64,
    pub reconcile_failed: bool,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another run held the lock; nothing was done.
    Skipped,
    Failed(RefreshError),
}

impl RefreshOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RefreshOutcome::Completed(_))
    }
}

pub struct Refresher {
    store: Arc<dyn CacheStore>,
    feed: Arc<dyn FeedSource>,
    summarizer: Arc<dyn Summarizer>,
    settings: RefreshSettings,
    running: AtomicBool,
}

/// Holds the single-flight flag; clears it on drop.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How one item's summary was produced.
enum Enrichment {
    Summarized,
    Reused,
    Fallback,
}

impl Refresher {
    pub fn new(
        store: Arc<dyn CacheStore>,
        feed: Arc<dyn FeedSource>,
        summarizer: Arc<dyn Summarizer>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            store,
            feed,
            summarizer,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Whether a run currently holds the lock.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run once and report success as a plain flag: `true` only when a run
    /// was performed and completed.
    pub async fn run_refresh(&self) -> bool {
        self.try_refresh().await.is_completed()
    }

    /// Run once, returning what happened.
    pub async fn try_refresh(&self) -> RefreshOutcome {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::debug!("refresh already running; trigger dropped");
            return RefreshOutcome::Skipped;
        };

        let started = Instant::now();
        tracing::info!(
            backend = self.store.backend(),
            summarizer = self.summarizer.name(),
            "refresh started"
        );

        match self.run_locked().await {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    fetched = report.fetched,
                    processed = report.processed,
                    summarized = report.summarized,
                    reused = report.reused,
                    fallbacks = report.fallbacks,
                    store_failures = report.store_failures,
                    removed = report.removed,
                    duration_ms = report.duration_ms,
                    "refresh completed"
                );
                RefreshOutcome::Completed(report)
            }
            Err(e) => {
                tracing::error!(error = %error_chain(&e), "refresh failed");
                RefreshOutcome::Failed(e)
            }
        }
    }

    async fn run_locked(&self) -> Result<RefreshReport, RefreshError> {
        if self.settings.migrate_on_run {
            if let Err(e) = self.store.migrate_schema().await {
                tracing::warn!(error = %e, "schema migration failed; continuing");
            }
        }

        let entries = self
            .feed
            .fetch_hot()
            .await
            .map_err(RefreshError::FeedFetch)?;
        if entries.is_empty() {
            // nothing to reconcile against; keep the cache but count the run
            tracing::warn!("feed returned no items; keeping the current cache");
            self.mark_completed().await;
            return Ok(RefreshReport::default());
        }

        let reusable = self.reusable_summaries().await;

        let mut report = RefreshReport {
            fetched: entries.len(),
            ..RefreshReport::default()
        };
        let mut seen: HashSet<i64> = HashSet::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if seen.contains(&entry.id) {
                tracing::debug!(item_id = entry.id, "duplicate id in feed; skipped");
                continue;
            }
            let rank = index as i64 + 1;

            let (summary, how) = match reusable.get(&entry.id) {
                Some(existing) => (existing.clone(), Enrichment::Reused),
                None => self.enrich(entry, rank).await,
            };

            let item = Item {
                id: entry.id,
                title: entry.title.clone(),
                source: self.settings.source_tag.clone(),
                display_time: format_display_time(entry.created, self.settings.display_offset),
                link: entry.url.clone(),
                summary,
                rank,
            };

            // a failed write still counts as seen so the previous row is kept
            seen.insert(entry.id);
            if let Err(e) = self.store.upsert_one(&item).await {
                tracing::warn!(item_id = entry.id, rank, error = %e, "failed to persist item");
                report.store_failures += 1;
                continue;
            }

            report.processed += 1;
            match how {
                Enrichment::Summarized => report.summarized += 1,
                Enrichment::Reused => report.reused += 1,
                Enrichment::Fallback => report.fallbacks += 1,
            }
        }

        match self.store.delete_not_in(&seen).await {
            Ok(removed) => report.removed = removed,
            Err(e) => {
                tracing::warn!(error = %e, "reconciliation failed; stale items kept");
                report.reconcile_failed = true;
            }
        }

        self.mark_completed().await;
        Ok(report)
    }

    async fn mark_completed(&self) {
        if let Err(e) = self.store.mark_refreshed(now_ms()).await {
            tracing::warn!(error = %e, "failed to record run completion time");
        }
    }

    /// Cached summaries that may be kept as-is, keyed by id. Empty when
    /// reuse is off or the cache cannot be read.
    async fn reusable_summaries(&self) -> HashMap<i64, Vec<String>> {
        if !self.settings.reuse_summaries {
            return HashMap::new();
        }
        match self.store.read_all().await {
            Ok(snapshot) => snapshot
                .items
                .into_iter()
                .filter(|item| !is_fallback(&item.summary))
                .map(|item| (item.id, item.summary))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read cache for summary reuse");
                HashMap::new()
            }
        }
    }

    /// Thread fetch, pacing delay, summarizer call. Never fails: every
    /// failure degrades to the fallback summary.
    async fn enrich(&self, entry: &FeedEntry, rank: i64) -> (Vec<String>, Enrichment) {
        let transcript = match self.feed.fetch_replies(entry.id).await {
            Ok(replies) => format_transcript(&replies),
            Err(e) => {
                tracing::warn!(item_id = entry.id, rank, error = %e, "thread fetch failed");
                NO_COMMENTS.to_string()
            }
        };

        if !self.settings.item_delay.is_zero() {
            tokio::time::sleep(self.settings.item_delay).await;
        }

        let result = self
            .summarizer
            .summarize(&entry.title, &entry.content, &transcript)
            .await
            .map(|bullets| {
                bullets
                    .into_iter()
                    .filter(|b| !b.trim().is_empty())
                    .collect::<Vec<_>>()
            });

        match result {
            Ok(bullets) if !bullets.is_empty() => (bullets, Enrichment::Summarized),
            Ok(_) => {
                tracing::warn!(item_id = entry.id, rank, "summarizer returned no bullets");
                (self.fallback(entry), Enrichment::Fallback)
            }
            Err(e) => {
                tracing::warn!(item_id = entry.id, rank, error = %e, "summarization failed");
                (self.fallback(entry), Enrichment::Fallback)
            }
        }
    }

    fn fallback(&self, entry: &FeedEntry) -> Vec<String> {
        fallback_summary(&entry.content, self.settings.fallback_excerpt_chars)
    }
}
