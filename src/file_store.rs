//! JSON-file [`CacheStore`] implementation.
//!
//! The whole cache is one JSON document:
//!
//! ```json
//! { "schema_version": 1, "last_refreshed": 1700000000000, "items": [ ... ] }
//! ```
//!
//! Every write rewrites the document to a sibling `.tmp` file and renames
//! it into place, so readers see either the old or the new document. A
//! missing file reads as the empty, never-refreshed snapshot.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hotfeed_core::models::{now_ms, CacheSnapshot, Item};
use hotfeed_core::store::CacheStore;

/// Version written by this build. Version 0 documents predate `rank`.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    schema_version: u32,
    #[serde(default, alias = "lastUpdated")]
    last_refreshed: i64,
    #[serde(default)]
    items: Vec<Item>,
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Option<Document>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let doc = serde_json::from_str(&content)
                    .with_context(|| format!("Invalid cache file: {}", self.path.display()))?;
                Ok(Some(doc))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read cache file: {}", self.path.display())),
        }
    }

    async fn load_or_default(&self) -> Result<Document> {
        Ok(self.load().await?.unwrap_or_else(|| Document {
            schema_version: SCHEMA_VERSION,
            ..Document::default()
        }))
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn read_all(&self) -> Result<CacheSnapshot> {
        let doc = self.load_or_default().await?;
        let mut snapshot = CacheSnapshot {
            last_refreshed: doc.last_refreshed,
            items: doc.items,
        };
        snapshot.sort_for_display();
        Ok(snapshot)
    }

    async fn upsert_one(&self, item: &Item) -> Result<()> {
        let mut doc = self.load_or_default().await?;
        match doc.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => doc.items.push(item.clone()),
        }
        doc.last_refreshed = doc.last_refreshed.max(now_ms());
        self.save(&doc).await
    }

    async fn delete_not_in(&self, keep: &HashSet<i64>) -> Result<u64> {
        let Some(mut doc) = self.load().await? else {
            return Ok(0);
        };
        let before = doc.items.len();
        doc.items.retain(|i| keep.contains(&i.id));
        let removed = (before - doc.items.len()) as u64;
        if removed > 0 {
            self.save(&doc).await?;
        }
        Ok(removed)
    }

    async fn mark_refreshed(&self, at_ms: i64) -> Result<()> {
        let mut doc = self.load_or_default().await?;
        if at_ms > doc.last_refreshed {
            doc.last_refreshed = at_ms;
            self.save(&doc).await?;
        }
        Ok(())
    }

    async fn migrate_schema(&self) -> Result<()> {
        match self.load().await? {
            None => {
                self.save(&Document {
                    schema_version: SCHEMA_VERSION,
                    ..Document::default()
                })
                .await
            }
            // serde already filled missing ranks with the default
            Some(mut doc) if doc.schema_version < SCHEMA_VERSION => {
                doc.schema_version = SCHEMA_VERSION;
                self.save(&doc).await
            }
            Some(_) => Ok(()),
        }
    }
}
