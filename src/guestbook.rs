//! Guestbook read and write services.
//!
//! Reads return the 50 most recent entries, newest first, without the
//! stored IP hash. Writes run an ordered pipeline of anti-abuse and
//! validation checks where the first failure short-circuits the rest:
//! rate limit, JSON parse, honeypot, presence, length. Only a fully
//! validated entry touches the table store, so a rejected request never
//! leaves a partial write behind.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{GUESTBOOK_PAGE_SIZE, GUESTBOOK_RATE_TTL, MAX_MESSAGE_CHARS, MAX_NAME_CHARS};
use crate::privacy::hash_ip;
use crate::store::GuestbookEntry;
use crate::{ApiError, AppState, Result};

/// Prefix for guestbook rate-limit marker keys; the hashed identifier is
/// appended.
pub const GUESTBOOK_RATE_PREFIX: &str = "guestbook_rate_";

/// Retry hint returned with 429 responses.
pub const RETRY_AFTER_HINT: &str = "1 hour";

/// A guestbook entry as exposed over the API. No `ip_hash`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicEntry {
    /// Display name.
    pub name: String,
    /// Message body.
    pub message: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
}

impl From<GuestbookEntry> for PublicEntry {
    fn from(entry: GuestbookEntry) -> Self {
        Self {
            name: entry.name,
            message: entry.message,
            created_at: entry.created_at,
        }
    }
}

/// Candidate entry as submitted by the front end.
///
/// `website` is the honeypot: the form hides it from humans, so any
/// non-empty value marks an automated submission.
#[derive(Debug, Default, Deserialize)]
pub struct Submission {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    website: String,
}

/// Result of a write attempt that did not error.
#[derive(Debug, PartialEq)]
pub enum PostOutcome {
    /// The entry was validated and persisted.
    Accepted(PublicEntry),
    /// The honeypot tripped: the caller gets the same success shape as a
    /// real post, but nothing was stored and no marker was written. The
    /// sender must not be able to tell it was rejected.
    Discarded,
}

/// Returns the most recent guestbook entries, newest first.
pub async fn recent_entries(state: &AppState) -> Result<Vec<PublicEntry>> {
    let entries = state.entries.recent(GUESTBOOK_PAGE_SIZE).await?;
    Ok(entries.into_iter().map(PublicEntry::from).collect())
}

/// Validates and persists a guestbook submission.
///
/// Checks run strictly in order; the rate limit is consulted before the
/// body is even parsed. Length limits are measured in characters before
/// trimming; the stored fields are trimmed and hard-truncated afterwards
/// as defense in depth.
pub async fn post_entry(state: &AppState, client_ip: &str, body: &[u8]) -> Result<PostOutcome> {
    let ip_hash = hash_ip(client_ip, &state.config.ip_salt);
    let marker_key = format!("{GUESTBOOK_RATE_PREFIX}{ip_hash}");

    if state.kv.get(&marker_key).await?.is_some() {
        warn!(%ip_hash, "guestbook post rate limited");
        return Err(ApiError::RateLimited {
            retry_after: RETRY_AFTER_HINT,
        });
    }

    let submission: Submission =
        serde_json::from_slice(body).map_err(|_| ApiError::InvalidJson)?;

    if !submission.website.is_empty() {
        info!(%ip_hash, "honeypot tripped, discarding submission");
        return Ok(PostOutcome::Discarded);
    }

    if submission.name.is_empty() || submission.message.is_empty() {
        return Err(ApiError::MissingFields);
    }

    if submission.name.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::FieldTooLong {
            field: "Name",
            limit: MAX_NAME_CHARS,
        });
    }

    if submission.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::FieldTooLong {
            field: "Message",
            limit: MAX_MESSAGE_CHARS,
        });
    }

    let entry = GuestbookEntry {
        name: sanitize(&submission.name, MAX_NAME_CHARS),
        message: sanitize(&submission.message, MAX_MESSAGE_CHARS),
        ip_hash,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    state.entries.insert(&entry).await?;
    state
        .kv
        .put(&marker_key, "1", Some(GUESTBOOK_RATE_TTL))
        .await?;

    info!(name = %entry.name, "guestbook entry persisted");
    Ok(PostOutcome::Accepted(entry.into()))
}

/// Trims surrounding whitespace and truncates to `max_chars` characters.
fn sanitize(input: &str, max_chars: usize) -> String {
    input.trim().chars().take(max_chars).collect()
}
