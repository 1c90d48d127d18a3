//! Feed source adapter.
//!
//! [`FeedSource`] is the I/O boundary for the upstream feed: the ranked hot
//! list, and one discussion thread per item. [`HttpFeedSource`] talks to a
//! JSON HTTP API shaped like V2EX's (`/api/topics/hot.json`,
//! `/api/replies/show.json?topic_id=N`).
//!
//! Any non-success status or undecodable body is an error; the caller
//! decides whether that is fatal (hot list) or degrades (thread).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use hotfeed_core::models::{FeedEntry, Reply};

use crate::config::{FeedConfig, ID_PLACEHOLDER};

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current ranked list, best first.
    async fn fetch_hot(&self) -> Result<Vec<FeedEntry>>;

    /// Fetch the discussion thread of item `id`, in thread order.
    async fn fetch_replies(&self, id: i64) -> Result<Vec<Reply>>;
}

/// Reply as it appears on the wire. Accepts both the flat `{author, content}`
/// shape and V2EX's `{member: {username}, content}`.
#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    member: Option<WireMember>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    username: String,
}

impl From<WireReply> for Reply {
    fn from(w: WireReply) -> Self {
        let author = w
            .author
            .or_else(|| w.member.map(|m| m.username))
            .unwrap_or_else(|| "anonymous".to_string());
        Reply {
            author,
            content: w.content,
        }
    }
}

pub struct HttpFeedSource {
    client: reqwest::Client,
    hot_url: String,
    replies_url: String,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building feed HTTP client")?;

        Ok(Self {
            client,
            hot_url: config.hot_url.clone(),
            replies_url: config.replies_url.clone(),
        })
    }

    fn replies_url_for(&self, id: i64) -> String {
        self.replies_url.replace(ID_PLACEHOLDER, &id.to_string())
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_hot(&self) -> Result<Vec<FeedEntry>> {
        let resp = self
            .client
            .get(&self.hot_url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.hot_url))?
            .error_for_status()
            .context("hot list request failed")?;

        let entries: Vec<FeedEntry> = resp.json().await.context("decoding hot list")?;
        Ok(entries)
    }

    async fn fetch_replies(&self, id: i64) -> Result<Vec<Reply>> {
        let url = self.replies_url_for(id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("replies request for item {} failed", id))?;

        let replies: Vec<WireReply> = resp
            .json()
            .await
            .with_context(|| format!("decoding replies for item {}", id))?;
        Ok(replies.into_iter().map(Reply::from).collect())
    }
}
