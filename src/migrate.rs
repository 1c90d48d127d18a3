//! SQLite schema migrations.
//!
//! Every step inspects the current schema before changing it, so running
//! the migrations against a fresh, partially-upgraded, or current database
//! all converge on the same schema without relying on "column already
//! exists" errors.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use hotfeed_core::models::DEFAULT_RANK;

/// Key of the single metadata row holding the last-refreshed timestamp.
pub const CACHE_KEY: &str = "news_cache";

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS news_items (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            source TEXT NOT NULL,
            display_time TEXT NOT NULL,
            link TEXT NOT NULL,
            summary TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating news_items")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_metadata (
            key TEXT PRIMARY KEY,
            last_updated INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating cache_metadata")?;

    // rank was added after the first schema; add it only when missing
    if !column_exists(pool, "news_items", "rank").await? {
        sqlx::query(&format!(
            "ALTER TABLE news_items ADD COLUMN rank INTEGER NOT NULL DEFAULT {DEFAULT_RANK}"
        ))
        .execute(pool)
        .await
        .context("adding news_items.rank")?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_items_rank ON news_items(rank, id)")
        .execute(pool)
        .await?;

    // Seed "never refreshed" without clobbering an existing timestamp
    sqlx::query("INSERT OR IGNORE INTO cache_metadata (key, last_updated) VALUES (?, 0)")
        .bind(CACHE_KEY)
        .execute(pool)
        .await
        .context("seeding cache_metadata")?;

    Ok(())
}

/// Whether `table` currently has a column named `column`.
pub async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}
