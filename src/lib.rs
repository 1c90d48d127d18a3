//! # hotfeed
//!
//! Serves a ranked discussion feed from a local cache, with every item
//! enriched by an AI-generated bullet summary. Readers never wait on the
//! network or the model: a stale cache triggers a background refresh and
//! the reader gets whatever is cached right now.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  stale?  ┌───────────┐   ┌──────────────┐
//! │  Reader  │────────▶│  Monitor  │──▶│  Refresher   │
//! │ HTTP/CLI │          └───────────┘   │ single-flight│
//! └────┬─────┘                          └──┬────────┬──┘
//!      │                                   │        │
//!      │            ┌──────────────┐       │        ▼
//!      │            │  FeedSource  │◀──────┘  ┌────────────┐
//!      │            │  Summarizer  │          │ CacheStore │
//!      │            └──────────────┘          │ sqlite/file│
//!      └─────────────────────────────────────▶│   /memory  │
//!                                             └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Run-fatal refresh errors |
//! | [`backend`] | Store selection from config |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | SQLite schema migrations |
//! | [`sqlite_store`] | SQLite cache store |
//! | [`file_store`] | JSON-file cache store |
//! | [`feed`] | Feed source adapter |
//! | [`summarize`] | Summarizer adapter |
//! | [`refresh`] | Refresh orchestrator |
//! | [`monitor`] | Staleness monitor |
//! | [`pipeline`] | Wiring of store, adapters, orchestrator and monitor |
//! | [`server`] | Reader HTTP surface |
//!
//! Data types, summary rules and the `CacheStore` trait live in
//! [`hotfeed_core`] and are re-exported here.

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod file_store;
pub mod logging;
pub mod migrate;
pub mod monitor;
pub mod pipeline;
pub mod refresh;
pub mod server;
pub mod sqlite_store;
pub mod summarize;

pub use hotfeed_core::{models, store, summary};
