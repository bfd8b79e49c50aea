//!
//! Backend API for a personal static site: a retro visitor counter and a
//! public guestbook, served over plain HTTP with [Hyper].
//!
//! The static front end calls three endpoints (`GET /api/counter`,
//! `GET /api/guestbook`, `POST /api/guestbook`); everything else is a 404.
//! State lives behind the [`KvStore`] and [`EntryStore`] traits: the
//! counter value and rate-limit markers in a TTL-capable key-value table,
//! guestbook entries in an append-only table. Raw client IPs are never
//! stored; they are reduced to salted one-way hashes first.
//!
//! [Hyper]: https://hyper.rs/

pub mod config;
pub mod counter;
pub mod error;
pub mod guestbook;
pub mod privacy;
pub mod routes;
pub mod server;
pub mod store;

use std::sync::Arc;

pub use config::{Config, RuntimeConfig};
pub use error::ApiError;
pub use routes::{handle_request, BoxBody};
pub use store::{EntryStore, GuestbookEntry, KvStore, MemoryStore, SqliteStore};

/// A specialized `Result` type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Everything a request handler needs: validated configuration plus the
/// two external stores. Built once at startup and shared via `Arc`.
///
/// The services hold no state of their own; each request reads and writes
/// the stores directly, so concurrent requests only interact through them.
pub struct AppState {
    /// Validated configuration shared by all handlers.
    pub config: Arc<RuntimeConfig>,
    /// Key-value store holding the counter value and rate-limit markers.
    pub kv: Arc<dyn KvStore>,
    /// Append-only store holding guestbook entries.
    pub entries: Arc<dyn EntryStore>,
}

impl AppState {
    /// Assembles the shared state from a configuration and store handles.
    pub fn new(
        config: Arc<RuntimeConfig>,
        kv: Arc<dyn KvStore>,
        entries: Arc<dyn EntryStore>,
    ) -> Self {
        Self {
            config,
            kv,
            entries,
        }
    }

    /// Opens the SQLite database at the configured path and wires both
    /// store seams to it.
    pub fn open(config: Arc<RuntimeConfig>) -> Result<Self> {
        let store = SqliteStore::open(&config.database_path)?;
        let kv: Arc<dyn KvStore> = Arc::new(store.clone());
        let entries: Arc<dyn EntryStore> = Arc::new(store);
        Ok(Self::new(config, kv, entries))
    }
}
