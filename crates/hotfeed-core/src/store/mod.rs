//! Cache storage abstraction.
//!
//! The [`CacheStore`] trait is the only persistence boundary the refresh
//! pipeline depends on. Backends (in-memory here; SQLite and JSON file in
//! the `hotfeed` crate) are chosen once at startup and handed to the
//! orchestrator as `Arc<dyn CacheStore>`.
//!
//! # Concurrency contract
//!
//! Implementations may assume a single writer at a time; the refresh
//! orchestrator's single-flight lock provides that guarantee. Reads may
//! happen concurrently with the writer and may observe a run in progress.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`read_all`](CacheStore::read_all) | Full snapshot: items + last-refreshed timestamp |
//! | [`last_refreshed`](CacheStore::last_refreshed) | Cheap timestamp read for staleness checks |
//! | [`upsert_one`](CacheStore::upsert_one) | Insert or replace one item, advancing the timestamp |
//! | [`delete_not_in`](CacheStore::delete_not_in) | Reconcile: drop items whose ids are not in the set |
//! | [`mark_refreshed`](CacheStore::mark_refreshed) | Advance the timestamp without touching items |
//! | [`migrate_schema`](CacheStore::migrate_schema) | Idempotent, additive schema upgrade |

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CacheSnapshot, Item};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs (`"memory"`, `"sqlite"`, `"file"`).
    fn backend(&self) -> &'static str;

    /// Read every cached item plus the last-refreshed timestamp.
    ///
    /// Items are returned in display order (rank, then id).
    async fn read_all(&self) -> Result<CacheSnapshot>;

    /// Epoch milliseconds of the last refresh write, `0` if never.
    async fn last_refreshed(&self) -> Result<i64> {
        Ok(self.read_all().await?.last_refreshed)
    }

    /// Insert or replace `item` by id and advance the last-refreshed
    /// timestamp to "now". The timestamp never moves backwards.
    async fn upsert_one(&self, item: &Item) -> Result<()>;

    /// Delete every cached item whose id is not in `keep`.
    ///
    /// Returns the number of items removed.
    async fn delete_not_in(&self, keep: &HashSet<i64>) -> Result<u64>;

    /// Advance the last-refreshed timestamp to `at_ms` unless it is already
    /// later.
    async fn mark_refreshed(&self, at_ms: i64) -> Result<()>;

    /// Bring the backing schema up to date. Safe to call repeatedly.
    async fn migrate_schema(&self) -> Result<()>;
}
