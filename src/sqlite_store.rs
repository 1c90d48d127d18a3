//! SQLite-backed [`CacheStore`] implementation.
//!
//! Items live in `news_items` (summary bullets stored as a JSON array);
//! the last-refreshed timestamp lives in the `cache_metadata` row keyed
//! [`CACHE_KEY`]. Each upsert and its timestamp advance share one
//! transaction, so a crash never leaves an item written without the
//! timestamp moving (or vice versa).

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use hotfeed_core::models::{now_ms, CacheSnapshot, Item};
use hotfeed_core::store::CacheStore;

use crate::migrate::{self, CACHE_KEY};

const ADVANCE_TIMESTAMP: &str = r#"
    INSERT INTO cache_metadata (key, last_updated) VALUES (?, ?)
    ON CONFLICT(key) DO UPDATE SET
        last_updated = MAX(cache_metadata.last_updated, excluded.last_updated)
"#;

/// SQLite implementation of [`CacheStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn read_all(&self) -> Result<CacheSnapshot> {
        let last_refreshed = self.last_refreshed().await?;

        let rows = sqlx::query(
            "SELECT id, title, source, display_time, link, summary, rank FROM news_items ORDER BY rank ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let summary_json: String = row.get("summary");
            let summary: Vec<String> = serde_json::from_str(&summary_json)
                .with_context(|| format!("Invalid summary JSON for item {}", id))?;
            items.push(Item {
                id,
                title: row.get("title"),
                source: row.get("source"),
                display_time: row.get("display_time"),
                link: row.get("link"),
                summary,
                rank: row.get("rank"),
            });
        }

        Ok(CacheSnapshot {
            last_refreshed,
            items,
        })
    }

    async fn last_refreshed(&self) -> Result<i64> {
        let ts: Option<i64> =
            sqlx::query_scalar("SELECT last_updated FROM cache_metadata WHERE key = ?")
                .bind(CACHE_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts.unwrap_or(0))
    }

    async fn upsert_one(&self, item: &Item) -> Result<()> {
        let now = now_ms();
        let summary_json = serde_json::to_string(&item.summary)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO news_items (id, title, source, display_time, link, summary, rank, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source = excluded.source,
                display_time = excluded.display_time,
                link = excluded.link,
                summary = excluded.summary,
                rank = excluded.rank,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.source)
        .bind(&item.display_time)
        .bind(&item.link)
        .bind(&summary_json)
        .bind(item.rank)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(ADVANCE_TIMESTAMP)
            .bind(CACHE_KEY)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_not_in(&self, keep: &HashSet<i64>) -> Result<u64> {
        if keep.is_empty() {
            let res = sqlx::query("DELETE FROM news_items")
                .execute(&self.pool)
                .await?;
            return Ok(res.rows_affected());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM news_items WHERE id NOT IN (");
        let mut ids = qb.separated(", ");
        for id in keep {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn mark_refreshed(&self, at_ms: i64) -> Result<()> {
        sqlx::query(ADVANCE_TIMESTAMP)
            .bind(CACHE_KEY)
            .bind(at_ms)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn migrate_schema(&self) -> Result<()> {
        migrate::run_migrations(&self.pool).await
    }
}
