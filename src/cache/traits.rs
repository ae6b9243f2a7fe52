//! Core types for the caching system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached query result.
///
/// Owned by [`super::QueryCache`]; callers only see clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Raw response payload
  pub data: Value,
  /// Message of the last failed refetch, cleared on success
  pub error: Option<String>,
  /// When the payload was fetched
  pub fetched_at: DateTime<Utc>,
  /// From this moment on the payload must be refetched before use
  pub stale_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(data: Value, fetched_at: DateTime<Utc>, stale_time: chrono::Duration) -> Self {
    Self {
      data,
      error: None,
      fetched_at,
      stale_at: fetched_at + stale_time,
    }
  }

  pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.stale_at
  }

  pub fn is_stale(&self) -> bool {
    self.is_stale_at(Utc::now())
  }

  /// Age of the payload at `now`.
  pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
    now - self.fetched_at
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched (if from cache)
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

  /// Create a new cache result from a fresh cache entry.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Refetch failed, serving stale cached data
  Offline,
}

/// How a fetch treats existing cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
  /// Serve a fresh entry if there is one, otherwise fetch
  #[default]
  CacheFirst,
  /// Always fetch, then update the cache
  NetworkOnly,
}
