use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use hotfeed::error::RefreshError;
use hotfeed::feed::FeedSource;
use hotfeed::monitor::StalenessMonitor;
use hotfeed::refresh::{RefreshOutcome, RefreshSettings, Refresher};
use hotfeed::summarize::Summarizer;
use hotfeed_core::models::{now_ms, CacheSnapshot, FeedEntry, Item, Reply, DEFAULT_RANK};
use hotfeed_core::store::memory::InMemoryStore;
use hotfeed_core::store::CacheStore;
use hotfeed_core::summary::{is_fallback, UNAVAILABLE_MARKER};

// ============ Test doubles ============

fn entry(id: i64) -> FeedEntry {
    FeedEntry {
        id,
        title: format!("Topic {id}"),
        content: format!("Body of topic {id}\nsecond line"),
        url: format!("https://example.test/t/{id}"),
        created: 1_704_069_000 + id,
    }
}

fn cached(id: i64, summary: &[&str]) -> Item {
    Item {
        id,
        title: format!("Old topic {id}"),
        source: "V2EX".into(),
        display_time: "00:00".into(),
        link: format!("https://example.test/t/{id}"),
        summary: summary.iter().map(|s| s.to_string()).collect(),
        rank: DEFAULT_RANK,
    }
}

#[derive(Default)]
struct MockFeed {
    entries: Mutex<Vec<FeedEntry>>,
    fail_hot: AtomicBool,
    failing_threads: Mutex<HashSet<i64>>,
    hot_calls: AtomicUsize,
    thread_calls: Mutex<Vec<i64>>,
    /// When set, `fetch_hot` signals `entered` and waits on `gate`.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockFeed {
    fn with_ids(ids: &[i64]) -> Self {
        Self {
            entries: Mutex::new(ids.iter().copied().map(entry).collect()),
            ..Self::default()
        }
    }

    fn set_ids(&self, ids: &[i64]) {
        *self.entries.lock().unwrap() = ids.iter().copied().map(entry).collect();
    }

    fn fail_thread(&self, id: i64) {
        self.failing_threads.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn fetch_hot(&self) -> Result<Vec<FeedEntry>> {
        self.hot_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, gate)) = &self.gate {
            entered.notify_one();
            gate.notified().await;
        }
        if self.fail_hot.load(Ordering::SeqCst) {
            return Err(anyhow!("upstream returned 503"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn fetch_replies(&self, id: i64) -> Result<Vec<Reply>> {
        self.thread_calls.lock().unwrap().push(id);
        if self.failing_threads.lock().unwrap().contains(&id) {
            return Err(anyhow!("thread {id} returned 404"));
        }
        Ok(vec![Reply {
            author: "alice".into(),
            content: format!("reply on {id}"),
        }])
    }
}

#[derive(Default)]
struct MockSummarizer {
    calls: Mutex<Vec<(String, String)>>,
    /// Titles whose summarization errors.
    failing: Mutex<HashSet<String>>,
    /// Titles for which the model returns nothing usable.
    empty: Mutex<HashSet<String>>,
    panic_on_call: AtomicBool,
    /// Items visible in this store at each call, if set.
    observe: Option<Arc<InMemoryStore>>,
    observed: Mutex<Vec<Vec<i64>>>,
}

impl MockSummarizer {
    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, title: &str, _body: &str, transcript: &str) -> Result<Vec<String>> {
        if self.panic_on_call.load(Ordering::SeqCst) {
            panic!("summarizer exploded");
        }
        self.calls
            .lock()
            .unwrap()
            .push((title.to_string(), transcript.to_string()));
        if let Some(store) = &self.observe {
            let ids = store.read_all().await?.ids();
            self.observed.lock().unwrap().push(ids);
        }
        if self.failing.lock().unwrap().contains(title) {
            return Err(anyhow!("model overloaded"));
        }
        if self.empty.lock().unwrap().contains(title) {
            return Ok(vec!["   ".to_string()]);
        }
        Ok(vec![
            format!("{title} in one line"),
            "@alice said something".to_string(),
        ])
    }
}

fn settings() -> RefreshSettings {
    RefreshSettings {
        item_delay: Duration::ZERO,
        ..RefreshSettings::default()
    }
}

fn refresher(
    store: Arc<dyn CacheStore>,
    feed: Arc<MockFeed>,
    summarizer: Arc<MockSummarizer>,
) -> Arc<Refresher> {
    Arc::new(Refresher::new(store, feed, summarizer, settings()))
}

async fn snapshot(store: &dyn CacheStore) -> CacheSnapshot {
    store.read_all().await.unwrap()
}

/// Store wrapper with switchable failures.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_migrate: AtomicBool,
    fail_upsert_id: Mutex<Option<i64>>,
    fail_delete: AtomicBool,
}

#[async_trait]
impl CacheStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }
    async fn read_all(&self) -> Result<CacheSnapshot> {
        self.inner.read_all().await
    }
    async fn upsert_one(&self, item: &Item) -> Result<()> {
        if *self.fail_upsert_id.lock().unwrap() == Some(item.id) {
            return Err(anyhow!("disk full"));
        }
        self.inner.upsert_one(item).await
    }
    async fn delete_not_in(&self, keep: &HashSet<i64>) -> Result<u64> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        self.inner.delete_not_in(keep).await
    }
    async fn mark_refreshed(&self, at_ms: i64) -> Result<()> {
        self.inner.mark_refreshed(at_ms).await
    }
    async fn migrate_schema(&self) -> Result<()> {
        if self.fail_migrate.load(Ordering::SeqCst) {
            return Err(anyhow!("duplicate column name: rank"));
        }
        self.inner.migrate_schema().await
    }
}

// ============ Enrichment and fallback ============

#[tokio::test]
async fn every_cached_item_has_non_empty_summary() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 3, 4]));
    let summarizer = Arc::new(MockSummarizer::default());
    summarizer.failing.lock().unwrap().insert("Topic 2".into());
    summarizer.empty.lock().unwrap().insert("Topic 3".into());

    let r = refresher(store.clone(), feed, summarizer);
    let RefreshOutcome::Completed(report) = r.try_refresh().await else {
        panic!("refresh should complete");
    };

    assert_eq!(report.processed, 4);
    assert_eq!(report.summarized, 2);
    assert_eq!(report.fallbacks, 2);

    let snap = snapshot(&*store).await;
    assert_eq!(snap.items.len(), 4);
    for item in &snap.items {
        assert!(!item.summary.is_empty(), "item {} has empty summary", item.id);
        assert!(item.summary.iter().all(|l| !l.trim().is_empty()));
    }

    let two = snap.items.iter().find(|i| i.id == 2).unwrap();
    assert_eq!(
        two.summary,
        vec![
            "Body of topic 2 second line".to_string(),
            UNAVAILABLE_MARKER.to_string()
        ]
    );
    let three = snap.items.iter().find(|i| i.id == 3).unwrap();
    assert!(is_fallback(&three.summary));
}

#[tokio::test]
async fn thread_and_summary_failure_falls_back_and_run_continues() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[5, 7, 9]));
    feed.fail_thread(7);
    let summarizer = Arc::new(MockSummarizer::default());
    // the model sees "no comments" for item 7 and produces nothing useful
    summarizer.empty.lock().unwrap().insert("Topic 7".into());

    let r = refresher(store.clone(), feed.clone(), summarizer.clone());
    assert!(r.run_refresh().await);

    let snap = snapshot(&*store).await;
    assert_eq!(snap.ids(), vec![5, 7, 9]);
    let seven = snap.items.iter().find(|i| i.id == 7).unwrap();
    assert!(seven.summary.iter().any(|l| l == UNAVAILABLE_MARKER));

    assert_eq!(*feed.thread_calls.lock().unwrap(), vec![5, 7, 9]);
    let calls = summarizer.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1], ("Topic 7".to_string(), "no comments".to_string()));
    assert_eq!(calls[0].1, "[1 replies]\n#1 @alice: reply on 5");
}

#[tokio::test]
async fn thread_failure_alone_still_summarizes() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[7]));
    feed.fail_thread(7);
    let summarizer = Arc::new(MockSummarizer::default());

    let r = refresher(store.clone(), feed, summarizer);
    assert!(r.run_refresh().await);

    let snap = snapshot(&*store).await;
    assert!(!is_fallback(&snap.items[0].summary));
}

#[tokio::test]
async fn items_are_ranked_and_formatted() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[30, 10, 20]));
    let r = refresher(store.clone(), feed, Arc::new(MockSummarizer::default()));
    assert!(r.run_refresh().await);

    let snap = snapshot(&*store).await;
    assert_eq!(snap.ids(), vec![30, 10, 20]);
    let ranks: Vec<i64> = snap.items.iter().map(|i| i.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);

    let first = &snap.items[0];
    assert_eq!(first.source, "V2EX");
    assert_eq!(first.title, "Topic 30");
    assert_eq!(first.link, "https://example.test/t/30");
    // 1_704_069_030 is 00:30:30 UTC
    assert_eq!(first.display_time, "00:30");
}

#[tokio::test]
async fn duplicate_ids_are_processed_once() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 1, 3]));
    let summarizer = Arc::new(MockSummarizer::default());
    let r = refresher(store.clone(), feed, summarizer.clone());

    let RefreshOutcome::Completed(report) = r.try_refresh().await else {
        panic!("refresh should complete");
    };
    assert_eq!(report.fetched, 4);
    assert_eq!(report.processed, 3);
    assert_eq!(summarizer.call_count(), 3);

    let snap = snapshot(&*store).await;
    let one = snap.items.iter().find(|i| i.id == 1).unwrap();
    assert_eq!(one.rank, 1);
}

// ============ Persistence and reconciliation ============

#[tokio::test]
async fn reconciliation_keeps_exactly_the_fetched_ids() {
    let store = Arc::new(InMemoryStore::with_items(
        vec![
            cached(2, &["old two"]),
            cached(3, &["old three"]),
            cached(4, &["old four"]),
        ],
        1,
    ));
    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 3]));
    let summarizer = Arc::new(MockSummarizer::default());
    let mut s = settings();
    s.reuse_summaries = false;
    let r = Refresher::new(store.clone(), feed, summarizer, s);

    let RefreshOutcome::Completed(report) = r.try_refresh().await else {
        panic!("refresh should complete");
    };
    assert_eq!(report.removed, 1);

    let snap = snapshot(&*store).await;
    let mut ids = snap.ids();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);

    let two = snap.items.iter().find(|i| i.id == 2).unwrap();
    assert_eq!(two.title, "Topic 2");
    assert_eq!(two.rank, 2);
    assert_eq!(two.summary[0], "Topic 2 in one line");
}

#[tokio::test]
async fn each_item_is_persisted_before_the_next_is_summarized() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 3]));
    let summarizer = Arc::new(MockSummarizer {
        observe: Some(store.clone()),
        ..MockSummarizer::default()
    });
    let r = refresher(store.clone(), feed, summarizer.clone());
    assert!(r.run_refresh().await);

    let observed = summarizer.observed.lock().unwrap().clone();
    assert_eq!(observed, vec![vec![], vec![1], vec![1, 2]]);
}

#[tokio::test]
async fn store_failure_skips_item_and_run_continues() {
    let store = Arc::new(FlakyStore::default());
    *store.fail_upsert_id.lock().unwrap() = Some(2);
    store.inner.upsert_one(&cached(2, &["old point"])).await.unwrap();
    store.inner.upsert_one(&cached(99, &["stale"])).await.unwrap();

    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 3]));
    let summarizer = Arc::new(MockSummarizer::default());
    // reuse off so item 2 goes through the summarizer instead of keeping its row
    let r = Arc::new(Refresher::new(
        store.clone(),
        feed.clone(),
        summarizer.clone(),
        RefreshSettings {
            reuse_summaries: false,
            ..settings()
        },
    ));

    let report = match r.try_refresh().await {
        RefreshOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    };
    assert_eq!(report.processed, 2);
    assert_eq!(report.store_failures, 1);
    assert_eq!(report.removed, 1);
    assert!(!r.is_running());

    // items after the failed write were still fetched and summarized
    assert_eq!(*feed.thread_calls.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(summarizer.call_count(), 3);

    // 99 was reconciled away; the old row for 2 was kept, not deleted
    let snap = snapshot(&*store).await;
    let mut ids = snap.ids();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
    let two = snap.items.iter().find(|i| i.id == 2).unwrap();
    assert_eq!(two.summary, vec!["old point".to_string()]);
}

#[tokio::test]
async fn store_failure_still_reports_success() {
    let store = Arc::new(FlakyStore::default());
    *store.fail_upsert_id.lock().unwrap() = Some(1);
    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 3]));
    let r = refresher(store.clone(), feed, Arc::new(MockSummarizer::default()));

    assert!(r.run_refresh().await);
    let mut ids = snapshot(&*store).await.ids();
    ids.sort();
    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn reconcile_failure_is_advisory() {
    let store = Arc::new(FlakyStore::default());
    store.fail_delete.store(true, Ordering::SeqCst);
    store.inner.upsert_one(&cached(99, &["stale"])).await.unwrap();
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    let r = refresher(store.clone(), feed, Arc::new(MockSummarizer::default()));

    let report = match r.try_refresh().await {
        RefreshOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    };
    assert!(report.reconcile_failed);
    assert_eq!(report.removed, 0);

    let mut ids = snapshot(&*store).await.ids();
    ids.sort();
    assert_eq!(ids, vec![1, 99]);
}

#[tokio::test]
async fn migration_failure_is_advisory() {
    let store = Arc::new(FlakyStore::default());
    store.fail_migrate.store(true, Ordering::SeqCst);
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    let r = refresher(store.clone(), feed, Arc::new(MockSummarizer::default()));

    assert!(r.run_refresh().await);
    assert_eq!(snapshot(&*store).await.ids(), vec![1]);
}

// ============ Run-fatal failures ============

#[tokio::test]
async fn feed_failure_aborts_and_leaves_cache_untouched() {
    let before = vec![cached(2, &["kept"])];
    let store = Arc::new(InMemoryStore::with_items(before.clone(), 42));
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    feed.fail_hot.store(true, Ordering::SeqCst);
    let summarizer = Arc::new(MockSummarizer::default());
    let r = refresher(store.clone(), feed.clone(), summarizer.clone());

    match r.try_refresh().await {
        RefreshOutcome::Failed(RefreshError::FeedFetch(_)) => {}
        other => panic!("expected feed failure, got {other:?}"),
    }
    assert!(!r.is_running());
    assert_eq!(summarizer.call_count(), 0);

    let snap = snapshot(&*store).await;
    assert_eq!(snap.last_refreshed, 42);
    assert_eq!(snap.items, before);

    // lock was released: the next run proceeds
    feed.fail_hot.store(false, Ordering::SeqCst);
    assert!(r.run_refresh().await);
}

#[tokio::test]
async fn empty_feed_keeps_cache_and_counts_as_fresh() {
    let store = Arc::new(InMemoryStore::with_items(vec![cached(2, &["kept"])], 42));
    let feed = Arc::new(MockFeed::with_ids(&[]));
    let summarizer = Arc::new(MockSummarizer::default());
    let r = refresher(store.clone(), feed.clone(), summarizer.clone());

    let before = now_ms();
    let report = match r.try_refresh().await {
        RefreshOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    };
    assert_eq!(report.fetched, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(summarizer.call_count(), 0);

    let snap = snapshot(&*store).await;
    assert_eq!(snap.ids(), vec![2]);
    assert!(snap.last_refreshed >= before);

    // the timestamp moved, so a reader does not trigger another fetch
    let monitor = StalenessMonitor::new(r.clone(), Duration::from_secs(3600));
    assert!(monitor.maybe_trigger_refresh().await.is_none());
    assert_eq!(feed.hot_calls.load(Ordering::SeqCst), 1);
}

// ============ Single-flight ============

#[tokio::test]
async fn concurrent_triggers_run_once() {
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let feed = Arc::new(MockFeed {
        entries: Mutex::new(vec![entry(1), entry(2)]),
        gate: Some((entered.clone(), gate.clone())),
        ..MockFeed::default()
    });
    let summarizer = Arc::new(MockSummarizer::default());
    let store = Arc::new(InMemoryStore::new());
    let r = refresher(store.clone(), feed.clone(), summarizer.clone());

    let first = {
        let r = r.clone();
        tokio::spawn(async move { r.try_refresh().await })
    };
    entered.notified().await;
    assert!(r.is_running());

    // second trigger while the first holds the lock
    assert!(matches!(r.try_refresh().await, RefreshOutcome::Skipped));
    assert!(!r.run_refresh().await);

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert!(outcome.is_completed());

    assert_eq!(feed.hot_calls.load(Ordering::SeqCst), 1);
    assert_eq!(summarizer.call_count(), 2);
    assert!(!r.is_running());
}

#[tokio::test]
async fn separate_refreshers_do_not_share_a_lock() {
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let blocked_feed = Arc::new(MockFeed {
        entries: Mutex::new(vec![entry(1)]),
        gate: Some((entered.clone(), gate.clone())),
        ..MockFeed::default()
    });
    let a = refresher(
        Arc::new(InMemoryStore::new()),
        blocked_feed,
        Arc::new(MockSummarizer::default()),
    );
    let b = refresher(
        Arc::new(InMemoryStore::new()),
        Arc::new(MockFeed::with_ids(&[1])),
        Arc::new(MockSummarizer::default()),
    );

    let running = {
        let a = a.clone();
        tokio::spawn(async move { a.run_refresh().await })
    };
    entered.notified().await;

    assert!(b.run_refresh().await);

    gate.notify_one();
    assert!(running.await.unwrap());
}

#[tokio::test]
async fn lock_is_released_after_a_panicking_run() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    let summarizer = Arc::new(MockSummarizer::default());
    summarizer.panic_on_call.store(true, Ordering::SeqCst);
    let r = refresher(store.clone(), feed, summarizer.clone());

    let joined = {
        let r = r.clone();
        tokio::spawn(async move { r.try_refresh().await }).await
    };
    assert!(joined.unwrap_err().is_panic());
    assert!(!r.is_running());

    summarizer.panic_on_call.store(false, Ordering::SeqCst);
    assert!(r.run_refresh().await);
}

// ============ Summary reuse ============

#[tokio::test]
async fn good_summaries_are_reused_and_fallbacks_retried() {
    let fallback = vec!["Old body...".to_string(), UNAVAILABLE_MARKER.to_string()];
    let mut retry = cached(2, &[]);
    retry.summary = fallback;
    let store = Arc::new(InMemoryStore::with_items(
        vec![cached(1, &["kept bullet"]), retry],
        1,
    ));
    let feed = Arc::new(MockFeed::with_ids(&[1, 2]));
    let summarizer = Arc::new(MockSummarizer::default());
    let r = refresher(store.clone(), feed.clone(), summarizer.clone());

    let RefreshOutcome::Completed(report) = r.try_refresh().await else {
        panic!("refresh should complete");
    };
    assert_eq!(report.reused, 1);
    assert_eq!(report.summarized, 1);

    // no thread fetch or model call for the reused item
    assert_eq!(*feed.thread_calls.lock().unwrap(), vec![2]);
    assert_eq!(summarizer.call_count(), 1);

    let snap = snapshot(&*store).await;
    let one = snap.items.iter().find(|i| i.id == 1).unwrap();
    assert_eq!(one.summary, vec!["kept bullet".to_string()]);
    // metadata still refreshed
    assert_eq!(one.title, "Topic 1");
    assert_eq!(one.rank, 1);
    let two = snap.items.iter().find(|i| i.id == 2).unwrap();
    assert!(!is_fallback(&two.summary));
}

#[tokio::test]
async fn reuse_can_be_disabled() {
    let store = Arc::new(InMemoryStore::with_items(vec![cached(1, &["kept"])], 1));
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    let summarizer = Arc::new(MockSummarizer::default());
    let mut s = settings();
    s.reuse_summaries = false;
    let r = Refresher::new(store.clone(), feed, summarizer.clone(), s);

    assert!(r.run_refresh().await);
    assert_eq!(summarizer.call_count(), 1);
}

#[tokio::test]
async fn refreshing_twice_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[3, 1, 2]));
    let mut s = settings();
    s.reuse_summaries = false;
    let r = Refresher::new(
        store.clone(),
        feed,
        Arc::new(MockSummarizer::default()),
        s,
    );

    assert!(r.run_refresh().await);
    let once = snapshot(&*store).await;
    assert!(r.run_refresh().await);
    let twice = snapshot(&*store).await;

    assert_eq!(once.items, twice.items);
    assert!(twice.last_refreshed >= once.last_refreshed);
}

#[tokio::test]
async fn feed_changes_between_runs_are_reconciled() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[1, 2, 3]));
    let r = refresher(store.clone(), feed.clone(), Arc::new(MockSummarizer::default()));
    assert!(r.run_refresh().await);

    feed.set_ids(&[3, 4]);
    assert!(r.run_refresh().await);

    let snap = snapshot(&*store).await;
    assert_eq!(snap.ids(), vec![3, 4]);
    assert_eq!(snap.items[0].rank, 1);
}

// ============ Staleness monitor ============

#[tokio::test]
async fn monitor_triggers_only_when_stale() {
    let threshold = Duration::from_millis(3_600_000);

    let stale_store = Arc::new(InMemoryStore::with_items(vec![], now_ms() - 4_000_000));
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    let r = refresher(stale_store.clone(), feed.clone(), Arc::new(MockSummarizer::default()));
    let monitor = StalenessMonitor::new(r, threshold);
    let handle = monitor.maybe_trigger_refresh().await.expect("should trigger");
    handle.await.unwrap();
    assert_eq!(feed.hot_calls.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot(&*stale_store).await.ids(), vec![1]);

    let fresh_store = Arc::new(InMemoryStore::with_items(vec![], now_ms() - 100));
    let feed = Arc::new(MockFeed::with_ids(&[1]));
    let r = refresher(fresh_store, feed.clone(), Arc::new(MockSummarizer::default()));
    let monitor = StalenessMonitor::new(r, threshold);
    assert!(monitor.maybe_trigger_refresh().await.is_none());
    assert_eq!(feed.hot_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn monitor_does_not_wait_for_the_run() {
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let feed = Arc::new(MockFeed {
        entries: Mutex::new(vec![entry(1)]),
        gate: Some((entered.clone(), gate.clone())),
        ..MockFeed::default()
    });
    let r = refresher(
        Arc::new(InMemoryStore::new()),
        feed.clone(),
        Arc::new(MockSummarizer::default()),
    );
    let monitor = StalenessMonitor::new(r.clone(), Duration::from_secs(60));

    // returns while the run is still blocked inside the feed fetch
    let handle = monitor.maybe_trigger_refresh().await.expect("should trigger");
    entered.notified().await;
    assert!(r.is_running());

    // a burst of readers adds no runs
    for _ in 0..5 {
        assert!(monitor.maybe_trigger_refresh().await.is_none());
    }

    gate.notify_one();
    handle.await.unwrap();
    assert_eq!(feed.hot_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn monitor_contains_a_panicking_run() {
    let summarizer = Arc::new(MockSummarizer::default());
    summarizer.panic_on_call.store(true, Ordering::SeqCst);
    let r = refresher(
        Arc::new(InMemoryStore::new()),
        Arc::new(MockFeed::with_ids(&[1])),
        summarizer,
    );
    let monitor = StalenessMonitor::new(r.clone(), Duration::from_secs(60));

    let handle = monitor.maybe_trigger_refresh().await.expect("should trigger");
    // the outer task completes normally even though the run panicked
    handle.await.unwrap();
    assert!(!r.is_running());
}

#[tokio::test]
async fn last_refreshed_never_decreases() {
    let store = Arc::new(InMemoryStore::new());
    let feed = Arc::new(MockFeed::with_ids(&[1, 2]));
    let r = refresher(store.clone(), feed, Arc::new(MockSummarizer::default()));
    let monitor = StalenessMonitor::new(r.clone(), Duration::from_secs(3600));

    let mut seen = vec![store.last_refreshed().await.unwrap()];
    for _ in 0..3 {
        if let Some(handle) = monitor.maybe_trigger_refresh().await {
            handle.await.unwrap();
        }
        seen.push(store.last_refreshed().await.unwrap());
    }
    // an explicit older mark must not move it back
    store.mark_refreshed(1).await.unwrap();
    seen.push(store.last_refreshed().await.unwrap());
    assert!(r.run_refresh().await);
    seen.push(store.last_refreshed().await.unwrap());

    assert_eq!(seen[0], 0);
    assert!(seen[1] > 0);
    // fresh after the first run: no further monitor-triggered runs
    assert_eq!(seen[1], seen[2]);
    assert_eq!(seen[2], seen[3]);
    assert!(seen.windows(2).all(|w| w[1] >= w[0]), "{seen:?}");
}
