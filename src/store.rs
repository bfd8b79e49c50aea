//! Store seams for the two external systems of record.
//!
//! The services treat persistence as two opaque dependencies: a key-value
//! store with optional time-to-live expiry ([`KvStore`], holding the
//! visitor counter and rate-limit markers) and an append-only table of
//! guestbook entries ([`EntryStore`]). Neither trait exposes update or
//! delete operations for entries; rows are immutable once written.
//!
//! [`SqliteStore`] backs both seams with one SQLite database.
//! [`MemoryStore`] is a hashmap-backed stand-in for unit tests and local
//! development. The stores implement their own consistency only; the
//! counter's read-modify-write stays unguarded by design (see
//! [`crate::counter`]).

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::{ApiError, Result};

/// Busy timeout applied to the SQLite connection.
const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// A single guestbook row as persisted.
///
/// `ip_hash` is the salted identifier from [`crate::privacy::hash_ip`],
/// never a raw address. It stays out of API responses; see
/// [`crate::guestbook::PublicEntry`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestbookEntry {
    /// Display name, trimmed, at most 50 characters.
    pub name: String,
    /// Message body, trimmed, at most 500 characters.
    pub message: String,
    /// Hashed identifier of the author.
    pub ip_hash: String,
    /// Server-assigned ISO-8601 creation timestamp.
    pub created_at: String,
}

/// Durable key-value storage with optional expiry.
///
/// Presence semantics matter more than values here: rate-limit markers
/// are checked only for existence, and an expired key must read back as
/// absent.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value for `key`, or `None` if unset or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`. With a `ttl`, the key reads back as
    /// absent once the duration has elapsed.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
}

/// Append-only guestbook storage ordered by creation time.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Persists a new entry.
    async fn insert(&self, entry: &GuestbookEntry) -> Result<()>;

    /// Returns up to `limit` entries, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<GuestbookEntry>>;
}

/// SQLite-backed implementation of both store seams.
///
/// One connection guarded by a mutex serves all requests; every query
/// here is a point read or single-row write, so contention stays short.
/// Key expiry is lazy: expired rows are dropped when read.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 expires_at INTEGER
             );
             CREATE TABLE IF NOT EXISTS guestbook (
                 id         INTEGER PRIMARY KEY AUTOINCREMENT,
                 name       TEXT NOT NULL,
                 message    TEXT NOT NULL,
                 ip_hash    TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_guestbook_created_at
                 ON guestbook (created_at DESC);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ApiError::Store("connection mutex poisoned".into()))
    }

    fn unix_now() -> Result<i64> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ApiError::Internal(format!("system clock before epoch: {e}")))?;
        Ok(now.as_secs() as i64)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Self::unix_now()?;
        let conn = self.lock()?;

        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((_, Some(expires_at))) if expires_at <= now => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = match ttl {
            Some(ttl) => Some(Self::unix_now()? + ttl.as_secs() as i64),
            None => None,
        };
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, value, expires_at],
        )?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn insert(&self, entry: &GuestbookEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO guestbook (name, message, ip_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.name, entry.message, entry.ip_hash, entry.created_at],
        )?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<GuestbookEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name, message, ip_hash, created_at
             FROM guestbook
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(GuestbookEntry {
                name: row.get(0)?,
                message: row.get(1)?,
                ip_hash: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

/// In-memory implementation of both store seams.
///
/// Backs the unit and integration tests, and works as a throwaway store
/// for local development. Expiry uses [`Instant`] so tests can exercise
/// it with a zero TTL instead of sleeping.
#[derive(Default)]
pub struct MemoryStore {
    kv: Mutex<HashMap<String, (String, Option<Instant>)>>,
    entries: Mutex<Vec<GuestbookEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_kv(&self) -> Result<MutexGuard<'_, HashMap<String, (String, Option<Instant>)>>> {
        self.kv
            .lock()
            .map_err(|_| ApiError::Store("kv mutex poisoned".into()))
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, Vec<GuestbookEntry>>> {
        self.entries
            .lock()
            .map_err(|_| ApiError::Store("entries mutex poisoned".into()))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut kv = self.lock_kv()?;
        match kv.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= Instant::now() => {
                kv.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock_kv()?
            .insert(key.to_owned(), (value.to_owned(), expires_at));
        Ok(())
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn insert(&self, entry: &GuestbookEntry) -> Result<()> {
        self.lock_entries()?.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<GuestbookEntry>> {
        let mut entries = self.lock_entries()?.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}
