//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::CacheResult;
use crate::error::SyncError;

/// Response cache in front of the web-service client.
///
/// Entries have no expiry: they live until invalidated by key or prefix, or
/// until the session clears the store on logout.
pub struct ResponseCache<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> ResponseCache<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Read through the cache.
  ///
  /// 1. If `use_cache` and an entry exists, return it without calling `fetcher`
  /// 2. Otherwise call `fetcher`; failures propagate and nothing is stored
  /// 3. Store the fresh value and return it
  ///
  /// A storage failure never fails the read: on lookup it counts as a miss, on
  /// store the fresh value is still returned.
  pub async fn read<T, F, Fut>(
    &self,
    key: &str,
    use_cache: bool,
    fetcher: F,
  ) -> Result<CacheResult<T>, SyncError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
  {
    if use_cache {
      match self.storage.get::<T>(key) {
        Ok(Some(cached)) => {
          debug!(key, "cache hit");
          return Ok(CacheResult::from_cache(cached.data, cached.cached_at));
        }
        Ok(None) => debug!(key, "cache miss"),
        Err(e) => warn!(key, error = %e, "Failed to read cache entry, fetching instead"),
      }
    } else {
      debug!(key, "cache bypassed");
    }

    let data = fetcher().await?;
    if let Err(e) = self.storage.put(key, &data) {
      warn!(key, error = %e, "Failed to store response in cache");
    }
    Ok(CacheResult::from_network(data))
  }

  /// Drop the entry for `key`. Invalidating an absent key is fine.
  pub fn invalidate(&self, key: &str) -> Result<(), SyncError> {
    let removed = self
      .storage
      .delete(key)
      .map_err(|e| SyncError::Storage(e.to_string()))?;
    debug!(key, removed, "invalidated cache key");
    Ok(())
  }

  /// Drop every entry whose key starts with `prefix`.
  pub fn invalidate_prefix(&self, prefix: &str) -> Result<(), SyncError> {
    let removed = self
      .storage
      .delete_prefix(prefix)
      .map_err(|e| SyncError::Storage(e.to_string()))?;
    debug!(prefix, removed, "invalidated cache prefix");
    Ok(())
  }

  /// Drop everything.
  pub fn clear(&self) -> Result<(), SyncError> {
    self
      .storage
      .clear()
      .map_err(|e| SyncError::Storage(e.to_string()))
  }
}

impl<S: CacheStorage> Clone for ResponseCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
