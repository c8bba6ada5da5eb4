//! SQLite and in-memory implementations of the cache store.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::{CacheBox, CacheEntry, CacheStore};

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the cache database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the cache database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    let purged = store.purge_expired()?;
    if purged > 0 {
      tracing::debug!(purged, "removed expired cache entries");
    }

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("lectern").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Delete every expired row. Returns the number of rows removed.
  pub fn purge_expired(&self) -> Result<usize> {
    let now = Utc::now().timestamp_millis();
    self
      .lock()?
      .execute(
        "DELETE FROM cache_entries WHERE written_at + ttl_secs * 1000 <= ?",
        params![now],
      )
      .map_err(|e| eyre!("Failed to purge expired entries: {}", e))
  }

  fn put_at(
    &self,
    cache_box: CacheBox,
    key: &str,
    value: &Value,
    ttl: Duration,
    written_at: DateTime<Utc>,
  ) -> Result<()> {
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;
    self.write_row(cache_box, key, &data, ttl, written_at)
  }

  fn write_row(
    &self,
    cache_box: CacheBox,
    key: &str,
    data: &[u8],
    ttl: Duration,
    written_at: DateTime<Utc>,
  ) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO cache_entries (box, key, data, written_at, ttl_secs)
         VALUES (?, ?, ?, ?, ?)",
        params![
          cache_box.name(),
          key,
          data,
          written_at.timestamp_millis(),
          ttl.num_seconds()
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}/{}: {}", cache_box, key, e))?;

    Ok(())
  }

  /// Store raw bytes as an entry, bypassing serialization.
  #[cfg(test)]
  pub fn put_raw(&self, cache_box: CacheBox, key: &str, data: &[u8]) -> Result<()> {
    self.write_row(cache_box, key, data, cache_box.ttl(), Utc::now())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cached value, partitioned by box
CREATE TABLE IF NOT EXISTS cache_entries (
    box TEXT NOT NULL,
    key TEXT NOT NULL,
    data BLOB NOT NULL,
    written_at INTEGER NOT NULL,
    ttl_secs INTEGER NOT NULL,
    PRIMARY KEY (box, key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_written
    ON cache_entries(box, written_at);
"#;

impl CacheStore for SqliteStore {
  fn get(&self, cache_box: CacheBox, key: &str) -> Result<Option<CacheEntry>> {
    let row: Option<(Vec<u8>, i64, i64)> = {
      let conn = self.lock()?;
      let mut stmt = conn
        .prepare(
          "SELECT data, written_at, ttl_secs FROM cache_entries
           WHERE box = ? AND key = ?",
        )
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      stmt
        .query_row(params![cache_box.name(), key], |row| {
          Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .optional()
        .map_err(|e| eyre!("Failed to read cache entry {}/{}: {}", cache_box, key, e))?
    };

    let Some((data, written_at_ms, ttl_secs)) = row else {
      return Ok(None);
    };

    let written_at = DateTime::from_timestamp_millis(written_at_ms)
      .ok_or_else(|| eyre!("Invalid write timestamp {} for {}/{}", written_at_ms, cache_box, key))?;
    let ttl = Duration::seconds(ttl_secs);

    if Utc::now() >= written_at + ttl {
      // Expired entries are dropped lazily on read
      self.remove(cache_box, key)?;
      return Ok(None);
    }

    // An undecodable blob reads as absent and is removed
    let value: Value = match serde_json::from_slice(&data) {
      Ok(value) => value,
      Err(e) => {
        tracing::warn!(%cache_box, key, error = %e, "removing undecodable cache entry");
        self.remove(cache_box, key)?;
        return Ok(None);
      }
    };

    Ok(Some(CacheEntry {
      value,
      written_at,
      ttl,
    }))
  }

  fn put(&self, cache_box: CacheBox, key: &str, value: &Value, ttl: Duration) -> Result<()> {
    self.put_at(cache_box, key, value, ttl, Utc::now())
  }

  fn remove(&self, cache_box: CacheBox, key: &str) -> Result<()> {
    self
      .lock()?
      .execute(
        "DELETE FROM cache_entries WHERE box = ? AND key = ?",
        params![cache_box.name(), key],
      )
      .map_err(|e| eyre!("Failed to remove cache entry {}/{}: {}", cache_box, key, e))?;

    Ok(())
  }

  fn keys(&self, cache_box: CacheBox) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let now = Utc::now().timestamp_millis();

    let mut stmt = conn
      .prepare(
        "SELECT key FROM cache_entries
         WHERE box = ? AND written_at + ttl_secs * 1000 > ?
         ORDER BY key",
      )
      .map_err(|e| eyre!("Failed to prepare key query: {}", e))?;

    let keys = stmt
      .query_map(params![cache_box.name(), now], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", cache_box, e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }

  fn contains(&self, cache_box: CacheBox, key: &str) -> Result<bool> {
    let conn = self.lock()?;
    let now = Utc::now().timestamp_millis();

    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM cache_entries
         WHERE box = ? AND key = ? AND written_at + ttl_secs * 1000 > ?",
        params![cache_box.name(), key, now],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to check cache entry {}/{}: {}", cache_box, key, e))?;

    Ok(found.is_some())
  }
}

/// Process-local cache store.
///
/// Nothing survives a restart; useful for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<(CacheBox, String), CacheEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<(CacheBox, String), CacheEntry>> {
    // A panic mid-insert cannot leave a HashMap entry half written
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
impl MemoryStore {
  /// Shift an entry's write timestamp into the past.
  pub fn backdate(&self, cache_box: CacheBox, key: &str, by: Duration) {
    if let Some(entry) = self.lock().get_mut(&(cache_box, key.to_string())) {
      entry.written_at = entry.written_at - by;
    }
  }

  /// Write an entry without going through the gateway.
  pub fn seed(&self, cache_box: CacheBox, key: &str, value: Value) {
    self.lock().insert(
      (cache_box, key.to_string()),
      CacheEntry::new(value, cache_box.ttl()),
    );
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, cache_box: CacheBox, key: &str) -> Result<Option<CacheEntry>> {
    let mut entries = self.lock();
    let map_key = (cache_box, key.to_string());

    let expired = match entries.get(&map_key) {
      Some(entry) if !entry.is_expired_at(Utc::now()) => return Ok(Some(entry.clone())),
      Some(_) => true,
      None => false,
    };

    if expired {
      entries.remove(&map_key);
    }
    Ok(None)
  }

  fn put(&self, cache_box: CacheBox, key: &str, value: &Value, ttl: Duration) -> Result<()> {
    self.lock().insert(
      (cache_box, key.to_string()),
      CacheEntry::new(value.clone(), ttl),
    );
    Ok(())
  }

  fn remove(&self, cache_box: CacheBox, key: &str) -> Result<()> {
    self.lock().remove(&(cache_box, key.to_string()));
    Ok(())
  }

  fn keys(&self, cache_box: CacheBox) -> Result<Vec<String>> {
    let now = Utc::now();
    let mut keys: Vec<String> = self
      .lock()
      .iter()
      .filter(|((b, _), entry)| *b == cache_box && !entry.is_expired_at(now))
      .map(|((_, key), _)| key.clone())
      .collect();
    keys.sort();
    Ok(keys)
  }
}
