//! Configuration loading and validation.
//!
//! The API reads its YAML configuration exactly once at startup. The raw
//! [`Config`] maps directly to the on-disk schema; [`Config::into_runtime`]
//! validates it into a [`RuntimeConfig`] that request handlers share via
//! `Arc` without touching the filesystem again.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ApiError, Result};

/// Default socket address the API binds to.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Default path of the SQLite database file.
pub const DEFAULT_DATABASE_PATH: &str = "./site-api.db";

/// Value the visitor counter starts from when the store has no row yet.
/// Carried over from the odometer reading of the previous site iteration.
pub const DEFAULT_COUNTER_SEED: u64 = 18_538;

/// Fallback salt used when `ip_salt` is not configured.
///
/// Predictable by anyone reading this source, which makes the stored IP
/// hashes brute-forceable over the IPv4 space. Startup logs a warning when
/// this is in use; operators should always set `ip_salt`.
pub const DEFAULT_IP_SALT: &str = "default-salt";

/// Default maximum request body size: 16 KiB. Guestbook payloads are tiny;
/// anything larger is rejected before buffering.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 16 * 1024;

/// Default maximum number of concurrent in-flight requests before
/// returning 503 Service Unavailable.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 1000;

/// How long a visitor stays counted before a repeat visit increments again.
pub const COUNTER_RATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum gap between guestbook posts from the same hashed identifier.
pub const GUESTBOOK_RATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Maximum guestbook name length, in characters.
pub const MAX_NAME_CHARS: usize = 50;

/// Maximum guestbook message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Number of entries a guestbook read returns, newest first.
pub const GUESTBOOK_PAGE_SIZE: usize = 50;

/// Raw configuration as deserialized from the YAML file.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Socket address the API listens on (default `"127.0.0.1:8787"`).
    #[serde(default)]
    pub listen: Option<String>,
    /// Canonical hostname of the site. Counter requests whose `Origin` or
    /// `Referer` does not contain it are served without incrementing.
    #[serde(default)]
    pub site_hostname: Option<String>,
    /// Path of the SQLite database file (default `"./site-api.db"`).
    #[serde(default)]
    pub database_path: Option<String>,
    /// Secret salt for IP hashing. Falls back to a fixed built-in value
    /// when unset, which is logged as a weakness at startup.
    #[serde(default)]
    pub ip_salt: Option<String>,
    /// Value the counter starts from when absent (default 18538).
    #[serde(default)]
    pub counter_seed: Option<u64>,
    /// Maximum allowed request body size in bytes (default: 16 KiB).
    /// Requests with a `Content-Length` exceeding this limit receive 413.
    #[serde(default)]
    pub max_body_size: Option<u64>,
    /// Maximum concurrent in-flight requests before returning 503
    /// Service Unavailable (default: 1000).
    #[serde(default)]
    pub max_concurrent_requests: Option<usize>,
}

/// Fully validated, ready-to-use configuration.
///
/// Created once at startup and shared across all request handlers via `Arc`.
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Socket address the API binds to.
    pub listen: SocketAddr,
    /// Canonical site hostname used for counter origin validation.
    pub site_hostname: String,
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
    /// Salt mixed into IP hashes.
    pub ip_salt: String,
    /// `true` when `ip_salt` was not configured and the built-in fallback
    /// is in use.
    pub default_salt: bool,
    /// Value the counter starts from when the store has no row.
    pub counter_seed: u64,
    /// Maximum request body size in bytes. Overflow yields 413.
    pub max_body_size: u64,
    /// Maximum concurrent in-flight requests. Overflow yields 503.
    pub max_concurrent_requests: usize,
}

impl Config {
    /// Loads configuration from a YAML file at the given path.
    ///
    /// Returns an [`ApiError::Config`] if the file cannot be opened or
    /// its contents fail YAML deserialization.
    pub fn load_from_file(file_path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let file = std::fs::File::open(file_path).map_err(|e| {
            ApiError::Config(format!(
                "failed to open {}: {e}",
                file_path.as_ref().display()
            ))
        })?;

        serde_yaml::from_reader(file)
            .map_err(|e| ApiError::Config(format!("failed to parse config: {e}")))
    }

    /// Validates all fields, producing a [`RuntimeConfig`].
    ///
    /// `site_hostname` must be set and non-empty; without it the counter
    /// could never tell the site's own front end from third-party callers.
    pub fn into_runtime(self) -> Result<RuntimeConfig> {
        let site_hostname = self
            .site_hostname
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ApiError::Config("site_hostname must be configured".into()))?;

        let listen_str = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        let listen = listen_str.parse::<SocketAddr>().map_err(|e| {
            ApiError::Config(format!("invalid listen address \"{listen_str}\": {e}"))
        })?;

        let database_path = self
            .database_path
            .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from);

        let (ip_salt, default_salt) = match self.ip_salt.filter(|s| !s.is_empty()) {
            Some(salt) => (salt, false),
            None => (DEFAULT_IP_SALT.to_owned(), true),
        };

        Ok(RuntimeConfig {
            listen,
            site_hostname,
            database_path,
            ip_salt,
            default_salt,
            counter_seed: self.counter_seed.unwrap_or(DEFAULT_COUNTER_SEED),
            max_body_size: self.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
            max_concurrent_requests: self
                .max_concurrent_requests
                .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS),
        })
    }
}
