//! Data types that flow through the refresh pipeline.
//!
//! [`FeedEntry`] and [`Reply`] are what the upstream feed hands us;
//! [`Item`] is what we persist and serve; [`CacheSnapshot`] is what a
//! reader sees.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Rank carried by items that have not been re-ranked by a fetch yet.
pub const DEFAULT_RANK: i64 = 9999;

/// One entry of the ranked "hot" list as returned by the feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    /// Unix seconds.
    pub created: i64,
}

/// One reply of an item's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub author: String,
    pub content: String,
}

/// An enriched, cached item.
///
/// `summary` is never empty once an item has gone through the pipeline:
/// enrichment failures substitute [`crate::summary::fallback_summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    /// Origin feed name, e.g. `"V2EX"`.
    pub source: String,
    /// Pre-formatted short display time (`HH:MM`).
    #[serde(rename = "time")]
    pub display_time: String,
    pub link: String,
    pub summary: Vec<String>,
    #[serde(default = "default_rank")]
    pub rank: i64,
}

fn default_rank() -> i64 {
    DEFAULT_RANK
}

/// Everything a reader can see at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Epoch milliseconds of the last refresh write; `0` means never.
    pub last_refreshed: i64,
    pub items: Vec<Item>,
}

impl CacheSnapshot {
    /// Sort items the way readers display them: by rank, then id.
    pub fn sort_for_display(&mut self) {
        self.items.sort_by_key(|i| (i.rank, i.id));
    }

    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.id).collect()
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a unix-seconds timestamp as `HH:MM` in the given offset.
///
/// Out-of-range timestamps format as `--:--` rather than failing the item.
pub fn format_display_time(created_secs: i64, offset: FixedOffset) -> String {
    DateTime::from_timestamp(created_secs, 0)
        .map(|dt| dt.with_timezone(&offset).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}
