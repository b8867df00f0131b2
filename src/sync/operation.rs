//! The fetch / retry / invalidate protocol shared by every controller.
//!
//! A `SyncOperation` drives one `SyncSource` through a small state machine:
//!
//! ```text
//! Idle -> Fetching -> Loaded
//!                  -> FetchFailed -> RetryingWithoutCache -> Loaded | Failed
//! Loaded -> Invalidating -> Fetching
//! ```
//!
//! A failed cached attempt is retried exactly once, after invalidating the
//! source's cache entries, because a stale entry left by an earlier session
//! looks the same as a broken request until the network is asked. Only the
//! failure of that forced attempt reaches the user.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{EntityType, ErrorMessages};
use crate::cache::{CacheResult, CacheSource};
use crate::error::SyncError;
use crate::event::SyncEvent;

/// A data-consuming feature that can be loaded and invalidated.
#[async_trait]
pub trait SyncSource: Send + Sync {
  type Output: Send;

  /// Entity type, for default error messages and events.
  fn entity(&self) -> EntityType;

  /// Load everything the feature displays. With `use_cache == false` every
  /// primary read must go to the network.
  async fn load(&self, use_cache: bool) -> Result<CacheResult<Self::Output>, SyncError>;

  /// Drop every cache entry (and downloaded file) the feature depends on.
  async fn invalidate(&self) -> Result<(), SyncError>;
}

/// State of a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Fetching,
  Loaded,
  FetchFailed,
  RetryingWithoutCache,
  Failed,
  Invalidating,
}

/// Outcome of one fetch
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResult<T> {
  /// Served entirely from the cache
  FreshFromCache(T),
  /// At least one primary read went to the network
  FreshFromNetwork(T),
  /// The cached attempt failed and the forced retry succeeded
  RefreshedAfterFailure(T),
  /// User-facing failure message
  Failed(String),
}

impl<T> SyncResult<T> {
  pub fn data(&self) -> Option<&T> {
    match self {
      SyncResult::FreshFromCache(data)
      | SyncResult::FreshFromNetwork(data)
      | SyncResult::RefreshedAfterFailure(data) => Some(data),
      SyncResult::Failed(_) => None,
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      SyncResult::FreshFromCache(data)
      | SyncResult::FreshFromNetwork(data)
      | SyncResult::RefreshedAfterFailure(data) => Some(data),
      SyncResult::Failed(_) => None,
    }
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, SyncResult::Failed(_))
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      SyncResult::Failed(message) => Some(message),
      _ => None,
    }
  }

  /// Short label of the outcome, for logs and CLI output.
  pub fn label(&self) -> &'static str {
    match self {
      SyncResult::FreshFromCache(_) => "fresh_from_cache",
      SyncResult::FreshFromNetwork(_) => "fresh_from_network",
      SyncResult::RefreshedAfterFailure(_) => "refreshed_after_failure",
      SyncResult::Failed(_) => "failed",
    }
  }
}

/// Drives a source through fetch, retry and refresh.
pub struct SyncOperation<S: SyncSource> {
  source: S,
  state: SyncState,
  messages: Arc<ErrorMessages>,
  events: mpsc::UnboundedSender<SyncEvent>,
}

impl<S: SyncSource> SyncOperation<S> {
  pub fn new(
    source: S,
    messages: Arc<ErrorMessages>,
    events: mpsc::UnboundedSender<SyncEvent>,
  ) -> Self {
    Self {
      source,
      state: SyncState::Idle,
      messages,
      events,
    }
  }

  pub fn state(&self) -> SyncState {
    self.state
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn into_source(self) -> S {
    self.source
  }

  /// Fetch the source's data.
  ///
  /// `refresh == false` tries the cache first and falls back to one forced
  /// network attempt; `refresh == true` goes to the network directly and
  /// surfaces its failure.
  pub async fn fetch(&mut self, refresh: bool) -> SyncResult<S::Output> {
    let use_cache = !refresh;
    let entity = self.source.entity();
    self.state = SyncState::Fetching;
    debug!(%entity, use_cache, "fetching");

    match self.source.load(use_cache).await {
      Ok(result) => {
        self.state = SyncState::Loaded;
        if use_cache && result.source == CacheSource::Cache {
          SyncResult::FreshFromCache(result.data)
        } else {
          SyncResult::FreshFromNetwork(result.data)
        }
      }
      Err(e) if e.is_fatal() => self.fail(e),
      Err(e) if use_cache => {
        self.state = SyncState::FetchFailed;
        info!(%entity, error = %e, "cached fetch failed, retrying without cache");
        self.retry_without_cache().await
      }
      Err(e) => self.fail(e),
    }
  }

  /// Drop the source's cached data without fetching.
  pub async fn invalidate(&mut self) -> Result<(), SyncError> {
    self.source.invalidate().await
  }

  /// Pull-to-refresh: invalidate, fetch from the network, then signal
  /// completion exactly once whatever the outcome.
  pub async fn invalidate_and_refetch(&mut self) -> SyncResult<S::Output> {
    let entity = self.source.entity();
    self.state = SyncState::Invalidating;
    if let Err(e) = self.source.invalidate().await {
      warn!(%entity, error = %e, "invalidation failed, refetching anyway");
    }

    let result = self.fetch(true).await;
    let _ = self.events.send(SyncEvent::RefreshComplete { entity });
    result
  }

  async fn retry_without_cache(&mut self) -> SyncResult<S::Output> {
    let entity = self.source.entity();
    self.state = SyncState::RetryingWithoutCache;
    if let Err(e) = self.source.invalidate().await {
      warn!(%entity, error = %e, "invalidation before retry failed");
    }

    match self.source.load(false).await {
      Ok(result) => {
        self.state = SyncState::Loaded;
        SyncResult::RefreshedAfterFailure(result.data)
      }
      Err(e) => self.fail(e),
    }
  }

  fn fail(&mut self, error: SyncError) -> SyncResult<S::Output> {
    let entity = self.source.entity();
    self.state = SyncState::Failed;

    let message = error
      .user_message()
      .map(String::from)
      .unwrap_or_else(|| self.messages.get(entity).to_string());
    warn!(%entity, error = %error, "fetch failed");

    let _ = self.events.send(SyncEvent::Error {
      entity,
      message: message.clone(),
    });
    SyncResult::Failed(message)
  }
}
