//! # hotfeed CLI
//!
//! ## Usage
//!
//! ```bash
//! hotfeed --config ./config/hotfeed.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hotfeed init` | Create the cache store and run schema migrations |
//! | `hotfeed refresh` | Run one refresh now and wait for it |
//! | `hotfeed status` | Show last-refreshed time, item count and staleness |
//! | `hotfeed list` | Print cached items with their summaries |
//! | `hotfeed serve` | Serve the cache over HTTP with background refresh |

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use hotfeed::backend::open_store;
use hotfeed::config::{self, Config};
use hotfeed::logging::init_logging;
use hotfeed::monitor::is_stale;
use hotfeed::pipeline::Pipeline;
use hotfeed::refresh::RefreshOutcome;
use hotfeed::server;
use hotfeed_core::models::now_ms;
use hotfeed_core::summary::is_fallback;

/// hotfeed: a cached, AI-summarized view of a ranked discussion feed.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hotfeed.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "hotfeed", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hotfeed.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache store.
    ///
    /// Idempotent: running it on an existing store only applies missing
    /// schema changes.
    Init,

    /// Fetch the feed, summarize every item and reconcile the cache.
    Refresh,

    /// Show cache freshness.
    Status,

    /// Print cached items in rank order.
    List {
        /// Emit the cache snapshot as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Serve the cache over HTTP.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = open_store(&cfg.store).await?;
            store.migrate_schema().await?;
            println!("Cache store initialized ({}).", store.backend());
        }
        Commands::Refresh => run_refresh(&cfg).await?,
        Commands::Status => print_status(&cfg).await?,
        Commands::List { json } => print_items(&cfg, json).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

async fn run_refresh(cfg: &Config) -> Result<()> {
    let pipeline = Pipeline::from_config(cfg).await?;
    match pipeline.refresher.try_refresh().await {
        RefreshOutcome::Completed(report) => {
            println!(
                "Refreshed {} items ({} summarized, {} reused, {} fallback), removed {} in {} ms.",
                report.processed,
                report.summarized,
                report.reused,
                report.fallbacks,
                report.removed,
                report.duration_ms
            );
            if report.store_failures > 0 {
                println!("{} items could not be written.", report.store_failures);
            }
            if report.reconcile_failed {
                println!("Removing stale items failed; they stay until the next run.");
            }
            Ok(())
        }
        RefreshOutcome::Skipped => {
            println!("A refresh is already running.");
            Ok(())
        }
        RefreshOutcome::Failed(e) => Err(e.into()),
    }
}

async fn print_status(cfg: &Config) -> Result<()> {
    let store = open_store(&cfg.store).await?;
    store.migrate_schema().await?;
    let snapshot = store.read_all().await?;
    let threshold = cfg.refresh.staleness_threshold();

    println!("Backend:        {}", store.backend());
    println!("Last refreshed: {}", format_timestamp(snapshot.last_refreshed));
    println!("Items:          {}", snapshot.items.len());
    println!(
        "Fallbacks:      {}",
        snapshot
            .items
            .iter()
            .filter(|i| is_fallback(&i.summary))
            .count()
    );
    println!(
        "Stale:          {} (threshold {}s)",
        if is_stale(now_ms(), snapshot.last_refreshed, threshold) {
            "yes"
        } else {
            "no"
        },
        threshold.as_secs()
    );
    Ok(())
}

async fn print_items(cfg: &Config, json: bool) -> Result<()> {
    let store = open_store(&cfg.store).await?;
    store.migrate_schema().await?;
    let snapshot = store.read_all().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if snapshot.items.is_empty() {
        println!("No cached items.");
        return Ok(());
    }

    for item in &snapshot.items {
        println!(
            "#{} [{}] {} ({} {})",
            item.rank, item.id, item.title, item.source, item.display_time
        );
        println!("   {}", item.link);
        for line in &item.summary {
            println!("   - {}", line);
        }
        println!();
    }
    Ok(())
}

fn format_timestamp(ms: i64) -> String {
    if ms == 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}
