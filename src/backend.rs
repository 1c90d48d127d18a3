//! Cache store selection.
//!
//! The configured backend is resolved exactly once, at startup, into an
//! `Arc<dyn CacheStore>`. Everything downstream (orchestrator, monitor,
//! reader endpoints) only sees the trait object.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

use hotfeed_core::store::memory::InMemoryStore;
use hotfeed_core::store::CacheStore;

use crate::config::StoreConfig;
use crate::db;
use crate::file_store::JsonFileStore;
use crate::sqlite_store::SqliteStore;

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend.as_str() {
        "sqlite" => {
            let pool = db::connect(&required_path(config)?).await?;
            Arc::new(SqliteStore::new(pool))
        }
        "file" => Arc::new(JsonFileStore::new(required_path(config)?)),
        "memory" => Arc::new(InMemoryStore::new()),
        other => bail!("Unknown store backend: '{}'", other),
    };
    tracing::debug!(backend = store.backend(), "cache store opened");
    Ok(store)
}

fn required_path(config: &StoreConfig) -> Result<PathBuf> {
    config
        .path
        .clone()
        .ok_or_else(|| anyhow!("store.path required for backend '{}'", config.backend))
}
