//! Core traits and types for the response cache.

use chrono::{DateTime, Utc};

/// A cacheable read, identified by a stable key.
///
/// Keys follow `<entity>:<subkind>:<id>[:<id>...]` so that all the entries of
/// a parent (a course, a plan) can be dropped with one prefix invalidation.
pub trait QueryKey {
  /// Deterministic cache key for this request.
  fn cache_key(&self) -> String;

  /// Human readable description, used in logs.
  fn description(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Transform the data, keeping the provenance.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }

  /// Combine with a dependent read; network wins over cache.
  pub fn and<U>(self, other: CacheResult<U>) -> CacheResult<(T, U)> {
    let (source, cached_at) = match (self.source, other.source) {
      (CacheSource::Cache, CacheSource::Cache) => (CacheSource::Cache, self.cached_at),
      _ => (CacheSource::Network, None),
    };
    CacheResult {
      data: (self.data, other.data),
      source,
      cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from the local cache without a network call
  Cache,
}
