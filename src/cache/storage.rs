//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;

/// A single cached resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  pub resource_key: String,
  pub payload: T,
  pub fetched_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Whether the entry is still within its TTL at `now`.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    self.expires_at > now
  }
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync + 'static {
  /// Look up the entry for `key` regardless of its age.
  ///
  /// A payload that no longer deserializes as `T` is reported as a miss.
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>>;

  /// Insert or replace the entry for `key`, stamping it with `now` and `now + ttl`.
  ///
  /// Concurrent writers to the same key resolve last-write-wins.
  fn upsert<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) the cache database.
  ///
  /// Uses `path` when given, otherwise the per-user data directory.
  pub fn open(path: Option<&Path>, clock: Arc<dyn Clock>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "opened cache database");

    Self::with_connection(conn, clock)
  }

  /// Open a private in-memory database. Nothing survives the process.
  pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn, clock)
  }

  fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
      clock,
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("repo-cache").join("cache.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }

  /// Number of stored entries, fresh or not.
  pub fn len(&self) -> Result<usize> {
    let count: i64 = self
      .conn()?
      .query_row("SELECT COUNT(*) FROM resource_cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count cache entries: {}", e))?;
    Ok(count as usize)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resource_cache (
    resource_key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

impl CacheStore for SqliteStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
    let row: Option<(String, String, String)> = self
      .conn()?
      .query_row(
        "SELECT payload, fetched_at, expires_at FROM resource_cache WHERE resource_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))?;

    let Some((payload, fetched_at, expires_at)) = row else {
      return Ok(None);
    };

    let decoded = serde_json::from_str::<T>(&payload)
      .map_err(|e| e.to_string())
      .and_then(|payload| Ok((payload, parse_datetime(&fetched_at)?, parse_datetime(&expires_at)?)));

    match decoded {
      Ok((payload, fetched_at, expires_at)) => Ok(Some(CacheEntry {
        resource_key: key.to_string(),
        payload,
        fetched_at,
        expires_at,
      })),
      Err(error) => {
        tracing::warn!(key, %error, "discarding unreadable cache entry");
        Ok(None)
      }
    }
  }

  fn upsert<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) -> Result<()> {
    let payload =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
    let fetched_at = self.clock.now();
    let expires_at = fetched_at
      .checked_add_signed(ttl)
      .ok_or_else(|| eyre!("TTL {} puts the expiry of {} out of range", ttl, key))?;

    self
      .conn()?
      .execute(
        "INSERT INTO resource_cache (resource_key, payload, fetched_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(resource_key) DO UPDATE SET
           payload = excluded.payload,
           fetched_at = excluded.fetched_at,
           expires_at = excluded.expires_at",
        params![
          key,
          payload,
          format_datetime(fetched_at),
          format_datetime(expires_at)
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

    Ok(())
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, String> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| format!("bad timestamp '{}': {}", s, e))
}
