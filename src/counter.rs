//! Visitor counter service.
//!
//! Answers "how many visits so far", incrementing at most once per unique
//! visitor per 24-hour window, and only for requests that plausibly came
//! from the site's own front end. Third-party callers, previews, and
//! repeat visitors all still get the current value back; the counter
//! endpoint never errors for origin or rate-limit reasons.
//!
//! The increment is a plain get/put read-modify-write against the
//! key-value store. Two first-time visitors arriving in the same instant
//! can read the same base value and lose one increment; that is accepted
//! for a vanity metric rather than papered over with locking.

use hyper::header::HeaderMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::COUNTER_RATE_TTL;
use crate::privacy::hash_ip;
use crate::{AppState, Result};

/// Key-value key holding the counter value.
pub const VISITOR_COUNT_KEY: &str = "visitor_count";

/// Prefix for counter rate-limit marker keys; the hashed identifier is
/// appended.
pub const COUNTER_RATE_PREFIX: &str = "counter_rate_";

/// Width the display string is zero-padded to.
const DISPLAY_DIGITS: usize = 6;

/// Counter value as returned to the front end.
#[derive(Debug, PartialEq, Serialize)]
pub struct CounterSnapshot {
    /// Total counted visits.
    pub count: u64,
    /// `count` zero-padded to six digits for the retro odometer look.
    /// Widens naturally past 999999.
    pub display: String,
}

impl CounterSnapshot {
    fn new(count: u64) -> Self {
        Self {
            count,
            display: format!("{count:0width$}", width = DISPLAY_DIGITS),
        }
    }
}

/// Returns `true` if the request's `Origin` or `Referer` names the
/// canonical site hostname.
///
/// Both headers are attacker-controlled, so this is a plausibility check
/// against drive-by inflation, not authentication. Requests with neither
/// header (previews, curl, the bare static HTML) are treated as invalid
/// and served without counting.
pub fn origin_is_valid(headers: &HeaderMap, hostname: &str) -> bool {
    ["origin", "referer"].iter().any(|header| {
        headers
            .get(*header)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(hostname))
    })
}

/// Records a visit and returns the counter value.
///
/// Increments only when the origin checks out and no 24-hour marker
/// exists for the caller's hashed identifier; otherwise the current
/// value is returned unchanged with no store writes at all.
pub async fn visit(state: &AppState, headers: &HeaderMap, client_ip: &str) -> Result<CounterSnapshot> {
    let current = state
        .kv
        .get(VISITOR_COUNT_KEY)
        .await?
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(state.config.counter_seed);

    if !origin_is_valid(headers, &state.config.site_hostname) {
        debug!(count = current, "counter read from unrecognized origin");
        return Ok(CounterSnapshot::new(current));
    }

    let ip_hash = hash_ip(client_ip, &state.config.ip_salt);
    let marker_key = format!("{COUNTER_RATE_PREFIX}{ip_hash}");

    if state.kv.get(&marker_key).await?.is_some() {
        debug!(count = current, "visitor already counted in this window");
        return Ok(CounterSnapshot::new(current));
    }

    let count = current + 1;
    state
        .kv
        .put(VISITOR_COUNT_KEY, &count.to_string(), None)
        .await?;
    state
        .kv
        .put(&marker_key, "1", Some(COUNTER_RATE_TTL))
        .await?;

    info!(count, "counted new visitor");
    Ok(CounterSnapshot::new(count))
}
