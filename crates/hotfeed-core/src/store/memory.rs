//! In-memory [`CacheStore`] implementation for tests and ephemeral runs.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Nothing survives the
//! process; migration is a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{now_ms, CacheSnapshot, Item};

use super::CacheStore;

#[derive(Default)]
struct State {
    items: HashMap<i64, Item>,
    last_refreshed: i64,
}

/// In-memory cache store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `items` and a timestamp.
    pub fn with_items(items: Vec<Item>, last_refreshed: i64) -> Self {
        Self {
            state: RwLock::new(State {
                items: items.into_iter().map(|i| (i.id, i)).collect(),
                last_refreshed,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn read_all(&self) -> Result<CacheSnapshot> {
        let state = self.read()?;
        let mut snapshot = CacheSnapshot {
            last_refreshed: state.last_refreshed,
            items: state.items.values().cloned().collect(),
        };
        snapshot.sort_for_display();
        Ok(snapshot)
    }

    async fn last_refreshed(&self) -> Result<i64> {
        Ok(self.read()?.last_refreshed)
    }

    async fn upsert_one(&self, item: &Item) -> Result<()> {
        let mut state = self.write()?;
        state.items.insert(item.id, item.clone());
        state.last_refreshed = state.last_refreshed.max(now_ms());
        Ok(())
    }

    async fn delete_not_in(&self, keep: &HashSet<i64>) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.items.len();
        state.items.retain(|id, _| keep.contains(id));
        Ok((before - state.items.len()) as u64)
    }

    async fn mark_refreshed(&self, at_ms: i64) -> Result<()> {
        let mut state = self.write()?;
        state.last_refreshed = state.last_refreshed.max(at_ms);
        Ok(())
    }

    async fn migrate_schema(&self) -> Result<()> {
        Ok(())
    }
}
