//! Summary post-processing and fallback rules.
//!
//! The summarizer returns free-form completion text. [`parse_bullets`]
//! turns it into an ordered list of non-empty bullets; when enrichment
//! fails or yields nothing, [`fallback_summary`] provides a deterministic
//! substitute so that a cached item always has at least one line to show.

use crate::models::Reply;

/// Marker bullet carried by every fallback summary.
pub const UNAVAILABLE_MARKER: &str = "(AI analysis unavailable)";

/// Transcript used when a thread is empty or could not be fetched.
pub const NO_COMMENTS: &str = "no comments";

/// Default excerpt length (in characters) for fallback summaries.
pub const DEFAULT_EXCERPT_CHARS: usize = 100;

/// Split raw completion text into summary bullets.
///
/// Reasoning traces (`<think>…</think>`) are dropped first. Each remaining
/// line loses any leading list-marker run (digits, `-`, `.`, `*`, `•`) and
/// surrounding whitespace; lines left empty are discarded.
pub fn parse_bullets(raw: &str) -> Vec<String> {
    strip_reasoning(raw)
        .lines()
        .map(|line| {
            line.trim_start()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '.' | '*' | '•'))
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// Remove `<think>…</think>` blocks. An unterminated block swallows the rest.
fn strip_reasoning(raw: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        match rest[start..].find(CLOSE) {
            Some(end) => rest = &rest[start + end + CLOSE.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Deterministic substitute used whenever enrichment fails.
///
/// Returns `[excerpt, UNAVAILABLE_MARKER]`, or only the marker when the body
/// has no visible text.
pub fn fallback_summary(body: &str, excerpt_chars: usize) -> Vec<String> {
    let flat = body
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if flat.is_empty() {
        return vec![UNAVAILABLE_MARKER.to_string()];
    }

    let mut excerpt: String = flat.chars().take(excerpt_chars).collect();
    if flat.chars().count() > excerpt_chars {
        excerpt.push_str("...");
    }
    vec![excerpt, UNAVAILABLE_MARKER.to_string()]
}

/// True when `summary` was produced by [`fallback_summary`] (or is empty).
///
/// Such summaries are never reused across runs.
pub fn is_fallback(summary: &[String]) -> bool {
    summary.is_empty() || summary.iter().any(|line| line == UNAVAILABLE_MARKER)
}

/// Render a discussion thread as the transcript given to the summarizer.
pub fn format_transcript(replies: &[Reply]) -> String {
    if replies.is_empty() {
        return NO_COMMENTS.to_string();
    }

    let mut out = format!("[{} replies]", replies.len());
    for (i, reply) in replies.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("#{} @{}: {}", i + 1, reply.author, reply.content));
    }
    out
}
