//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::{de::DeserializeOwned, Serialize};

use crate::db::Database;

/// A single cached response.
#[derive(Debug, Clone)]
pub struct CachedResponse<T> {
  /// The cached response
  pub data: T,
  /// When the response was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get the cached response for a key.
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedResponse<T>>>;

  /// Store a response, replacing any previous one for the key.
  fn put<T: Serialize>(&self, key: &str, data: &T) -> Result<()>;

  /// Remove the entry for a key. Absent keys are not an error.
  fn delete(&self, key: &str) -> Result<usize>;

  /// Remove every entry whose key starts with `prefix`.
  fn delete_prefix(&self, prefix: &str) -> Result<usize>;

  /// Remove everything.
  fn clear(&self) -> Result<()>;
}

/// SQLite-based cache storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteStorage {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedResponse<T>>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT data, cached_at FROM ws_cache WHERE cache_key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let result = stmt.query_row(params![key], |row| {
      Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
    });

    match result {
      Ok((data, cached_at_str)) => {
        let data: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cached response {}: {}", key, e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedResponse { data, cached_at }))
      }
      Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
      Err(e) => Err(eyre!("Failed to read cached response {}: {}", key, e)),
    }
  }

  fn put<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
    let conn = self.db.conn()?;
    let data =
      serde_json::to_vec(data).map_err(|e| eyre!("Failed to serialize response: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO ws_cache (cache_key, data, cached_at)
         VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    conn
      .execute("DELETE FROM ws_cache WHERE cache_key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete cache entry {}: {}", key, e))
  }

  fn delete_prefix(&self, prefix: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    // substr instead of LIKE: keys may legitimately contain '%' or '_'
    conn
      .execute(
        "DELETE FROM ws_cache WHERE substr(cache_key, 1, length(?1)) = ?1",
        params![prefix],
      )
      .map_err(|e| eyre!("Failed to delete cache entries under {}: {}", prefix, e))
  }

  fn clear(&self) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute("DELETE FROM ws_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
