//! Run-fatal errors of the refresh pipeline.
//!
//! Only the list fetch can fail a run. Per-item failures (thread fetch,
//! summarization, persisting one item) and advisory failures (schema
//! migration, summary reuse reads, reconciliation) are logged inside the
//! orchestrator and counted in its report instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to fetch the ranked item list")]
    FeedFetch(#[source] anyhow::Error),
}
