//! Summarizer adapter.
//!
//! A [`Summarizer`] turns an item (title, body, rendered reply transcript)
//! into a list of bullet points. The only real provider is an
//! OpenAI-compatible chat-completions endpoint ([`ChatSummarizer`]); the
//! `disabled` provider always errors, which the orchestrator turns into a
//! fallback summary.
//!
//! # Retry Strategy
//!
//! - HTTP 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - Network error → retry
//! - Any other non-success status → fail immediately
//!
//! Rate-limit negotiation (429 with `Retry-After`) is not attempted; a 429
//! fails the call and the item falls back.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use hotfeed_core::summary::parse_bullets;

use crate::config::SummarizerConfig;

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Summarize one item. An `Ok` result may still be empty; the caller
    /// treats an empty list like a failure.
    async fn summarize(&self, title: &str, body: &str, transcript: &str) -> Result<Vec<String>>;
}

const SYSTEM_PROMPT: &str = "You are an analyst of online community discussions. \
You distill a thread into its most useful points and quote notable replies.";

/// Build the user prompt sent for one item.
pub fn build_prompt(title: &str, body: &str, transcript: &str) -> String {
    let body = if body.trim().is_empty() {
        "(no body text)"
    } else {
        body
    };
    format!(
        "Title: {title}\n\
         Body: {body}\n\n\
         Replies:\n{transcript}\n\n\
         Summarize the post in one sentence, then list the main opinions, \
         disagreements, practical advice and memorable replies from the thread. \
         Quote replies as @author said \"...\". Use as many points as the \
         discussion warrants. Output one point per line with no preamble or \
         closing remarks."
    )
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// OpenAI-compatible chat-completions summarizer.
pub struct ChatSummarizer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl ChatSummarizer {
    pub fn new(config: &SummarizerConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building summarizer HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, title: &str, body: &str, transcript: &str) -> Result<Vec<String>> {
        let prompt = build_prompt(title, body, transcript);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying summarizer call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .context("decoding chat completion")?;
                        return Ok(parse_bullets(completion_text(&json)?));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.is_server_error() {
                        last_err = Some(anyhow!("summarizer API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("summarizer API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("summarizer failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn completion_text(json: &serde_json::Value) -> Result<&str> {
    json.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Invalid chat completion: missing choices[0].message.content"))
}

/// Summarizer used when no provider is configured. Every call fails, so
/// every item gets the fallback summary.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn summarize(&self, _title: &str, _body: &str, _transcript: &str) -> Result<Vec<String>> {
        bail!("summarizer is disabled")
    }
}

/// Build the summarizer named by `config.provider`.
///
/// For `openai` the API key is read from the environment variable named by
/// `config.api_key_env`; a missing key is a startup error rather than a
/// per-item failure.
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSummarizer)),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env)
                .map_err(|_| anyhow!("{} not set", config.api_key_env))?;
            Ok(Arc::new(ChatSummarizer::new(config, api_key)?))
        }
        other => bail!("Unknown summarizer provider: '{}'", other),
    }
}
