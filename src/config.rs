//! TOML configuration parsing and validation.
//!
//! hotfeed is configured through a single TOML file (default
//! `./config/hotfeed.toml`). Only `[store]` and `[feed]` are required;
//! every other section falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [store]
//! backend = "sqlite"
//! path = "./data/hotfeed.sqlite"
//!
//! [feed]
//! hot_url = "https://www.v2ex.com/api/topics/hot.json"
//! replies_url = "https://www.v2ex.com/api/replies/show.json?topic_id={id}"
//!
//! [summarizer]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [refresh]
//! staleness_threshold_secs = 3600
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the item id in `feed.replies_url`.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `"sqlite"`, `"file"` or `"memory"`.
    pub backend: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub hot_url: String,
    /// Thread URL template; `{id}` is replaced with the item id.
    pub replies_url: String,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_source_tag() -> String {
    "V2EX".to_string()
}
fn default_feed_timeout() -> u64 {
    15
}
fn default_user_agent() -> String {
    concat!("hotfeed/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_summarizer_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "SUMMARIZER_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_summarizer_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Maximum cache age before a reader triggers a refresh.
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold_secs: u64,
    /// Pause before each summarizer call.
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,
    /// Keep existing non-fallback summaries instead of re-summarizing.
    #[serde(default = "default_true")]
    pub reuse_summaries: bool,
    #[serde(default = "default_true")]
    pub migrate_on_run: bool,
    #[serde(default)]
    pub display_utc_offset_minutes: i32,
    #[serde(default = "default_excerpt_chars")]
    pub fallback_excerpt_chars: usize,
    /// Period of the background staleness check while serving.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: default_staleness_threshold(),
            item_delay_ms: default_item_delay(),
            reuse_summaries: true,
            migrate_on_run: true,
            display_utc_offset_minutes: 0,
            fallback_excerpt_chars: default_excerpt_chars(),
            check_interval_secs: default_check_interval(),
        }
    }
}

impl RefreshConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn default_staleness_threshold() -> u64 {
    3600
}
fn default_item_delay() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_excerpt_chars() -> usize {
    hotfeed_core::summary::DEFAULT_EXCERPT_CHARS
}
fn default_check_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate store
    match config.store.backend.as_str() {
        "memory" => {}
        "sqlite" | "file" => {
            if config.store.path.is_none() {
                bail!(
                    "store.path must be set when backend is '{}'",
                    config.store.backend
                );
            }
        }
        other => bail!(
            "Unknown store backend: '{}'. Must be sqlite, file, or memory.",
            other
        ),
    }

    // Validate feed
    if config.feed.hot_url.trim().is_empty() {
        bail!("feed.hot_url must not be empty");
    }
    if !config.feed.replies_url.contains(ID_PLACEHOLDER) {
        bail!("feed.replies_url must contain the {} placeholder", ID_PLACEHOLDER);
    }

    // Validate summarizer
    match config.summarizer.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.summarizer.model.trim().is_empty() {
                bail!("summarizer.model must be set when provider is 'openai'");
            }
            if config.summarizer.api_url.trim().is_empty() {
                bail!("summarizer.api_url must be set when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown summarizer provider: '{}'. Must be openai or disabled.",
            other
        ),
    }

    // Validate refresh
    if config.refresh.staleness_threshold_secs == 0 {
        bail!("refresh.staleness_threshold_secs must be > 0");
    }
    if config.refresh.fallback_excerpt_chars == 0 {
        bail!("refresh.fallback_excerpt_chars must be > 0");
    }
    if config.refresh.display_utc_offset_minutes.abs() >= 24 * 60 {
        bail!("refresh.display_utc_offset_minutes must be within ±1439");
    }
    if config.refresh.check_interval_secs == 0 {
        bail!("refresh.check_interval_secs must be > 0");
    }

    Ok(())
}
