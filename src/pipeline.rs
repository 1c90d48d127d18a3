//! Wiring of the configured store and adapters into an orchestrator and
//! monitor pair.

use std::sync::Arc;

use anyhow::Result;

use hotfeed_core::store::CacheStore;

use crate::backend::open_store;
use crate::config::Config;
use crate::feed::HttpFeedSource;
use crate::monitor::StalenessMonitor;
use crate::refresh::{RefreshSettings, Refresher};
use crate::summarize::create_summarizer;

#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn CacheStore>,
    pub refresher: Arc<Refresher>,
    pub monitor: Arc<StalenessMonitor>,
}

impl Pipeline {
    /// Open the configured store and build the HTTP adapters.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(&config.store).await?;
        let feed = Arc::new(HttpFeedSource::new(&config.feed)?);
        let summarizer = create_summarizer(&config.summarizer)?;

        let refresher = Arc::new(Refresher::new(
            store.clone(),
            feed,
            summarizer,
            RefreshSettings::from_config(config),
        ));
        Ok(Self::with_refresher(
            refresher,
            config.refresh.staleness_threshold(),
        ))
    }

    /// Build around an existing orchestrator (its store is reused).
    pub fn with_refresher(refresher: Arc<Refresher>, threshold: std::time::Duration) -> Self {
        let monitor = Arc::new(StalenessMonitor::new(refresher.clone(), threshold));
        Self {
            store: refresher.store().clone(),
            refresher,
            monitor,
        }
    }
}
