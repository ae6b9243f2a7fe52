//! Persistence of the query cache across restarts.
//!
//! The whole cache is serialized as one JSON blob under a versioned storage
//! key. On startup the blob is restored only if its version string matches
//! and it is younger than the configured maximum age. Writes are throttled
//! so a burst of cache updates produces a single storage write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::key::QueryKey;
use super::layer::QueryCache;
use super::traits::CacheEntry;
use crate::config::CacheConfig;
use crate::storage::LocalStorage;

#[derive(Debug, Clone)]
pub struct PersistOptions {
  /// Storage key of the blob
  pub key: String,
  /// Version string; any mismatch discards the blob
  pub buster: String,
  /// Oldest data that may be restored
  pub max_age: Duration,
  /// Minimum gap between two storage writes
  pub throttle: Duration,
}

impl From<&CacheConfig> for PersistOptions {
  fn from(config: &CacheConfig) -> Self {
    Self {
      key: config.storage_key.clone(),
      buster: config.buster.clone(),
      max_age: config.max_age(),
      throttle: config.throttle(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
  buster: String,
  timestamp: DateTime<Utc>,
  /// Entries by `QueryKey::cache_hash`
  queries: BTreeMap<String, PersistedQuery>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedQuery {
  key: QueryKey,
  entry: CacheEntry,
}

#[derive(Default)]
struct ThrottleState {
  last_write: Option<Instant>,
  pending: Option<PersistedCache>,
}

/// Writes cache snapshots to local storage and restores them on startup.
pub struct CachePersister {
  storage: Arc<dyn LocalStorage>,
  options: PersistOptions,
  throttle: Mutex<ThrottleState>,
}

impl CachePersister {
  pub fn new(storage: Arc<dyn LocalStorage>, options: PersistOptions) -> Self {
    Self {
      storage,
      options,
      throttle: Mutex::new(ThrottleState::default()),
    }
  }

  fn state(&self) -> MutexGuard<'_, ThrottleState> {
    self.throttle.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn max_age(&self) -> chrono::Duration {
    chrono::Duration::from_std(self.options.max_age).unwrap_or(chrono::Duration::MAX)
  }

  /// Restore persisted entries. Returns nothing on any problem.
  pub fn restore(&self) -> Vec<(QueryKey, CacheEntry)> {
    self.restore_at(Utc::now())
  }

  fn restore_at(&self, now: DateTime<Utc>) -> Vec<(QueryKey, CacheEntry)> {
    let json = match self.storage.get_item(&self.options.key) {
      Ok(Some(json)) => json,
      Ok(None) => return Vec::new(),
      Err(e) => {
        warn!("Could not read persisted cache: {}", e);
        return Vec::new();
      }
    };

    let blob: PersistedCache = match serde_json::from_str(&json) {
      Ok(blob) => blob,
      Err(e) => {
        warn!("Discarding unreadable persisted cache: {}", e);
        self.discard();
        return Vec::new();
      }
    };

    if blob.buster != self.options.buster {
      info!(
        persisted = %blob.buster,
        current = %self.options.buster,
        "Discarding persisted cache from another version"
      );
      self.discard();
      return Vec::new();
    }

    let max_age = self.max_age();
    if now - blob.timestamp > max_age {
      info!(persisted_at = %blob.timestamp, "Discarding expired persisted cache");
      self.discard();
      return Vec::new();
    }

    let persisted_at = blob.timestamp;
    let restored: Vec<(QueryKey, CacheEntry)> = blob
      .queries
      .into_values()
      .filter(|q| q.entry.age_at(now) <= max_age)
      .map(|PersistedQuery { key, mut entry }| {
        // Data that was fresh when persisted is served for the whole window
        if !entry.is_stale_at(persisted_at) {
          entry.stale_at = entry.fetched_at + max_age;
        }
        (key, entry)
      })
      .collect();

    debug!(count = restored.len(), "Restored persisted cache");
    restored
  }

  /// Queue a snapshot for writing, honouring the throttle window.
  pub fn schedule(&self, entries: Vec<(QueryKey, CacheEntry)>) {
    self.schedule_with(|| entries);
  }

  /// Like [`Self::schedule`], but takes the snapshot while holding the
  /// throttle lock so concurrent writers queue snapshots in order.
  pub fn schedule_with(&self, snapshot: impl FnOnce() -> Vec<(QueryKey, CacheEntry)>) {
    let mut state = self.state();
    let blob = PersistedCache {
      buster: self.options.buster.clone(),
      timestamp: Utc::now(),
      queries: snapshot()
        .into_iter()
        .map(|(key, entry)| (key.cache_hash(), PersistedQuery { key, entry }))
        .collect(),
    };

    state.pending = Some(blob);
    if Self::is_due(&state, self.options.throttle) {
      self.write_pending(&mut state);
    }
  }

  /// Write the pending snapshot if the throttle window has passed.
  pub fn flush_if_due(&self) -> bool {
    let mut state = self.state();
    if state.pending.is_some() && Self::is_due(&state, self.options.throttle) {
      self.write_pending(&mut state);
      return true;
    }
    false
  }

  /// Write the pending snapshot now.
  pub fn flush(&self) {
    let mut state = self.state();
    self.write_pending(&mut state);
  }

  /// Remove the persisted blob.
  pub fn discard(&self) {
    if let Err(e) = self.storage.remove_item(&self.options.key) {
      warn!("Failed to remove persisted cache: {}", e);
    }
  }

  /// Drop the pending snapshot and the persisted blob.
  pub fn reset(&self) {
    self.state().pending = None;
    self.discard();
  }

  fn is_due(state: &ThrottleState, throttle: Duration) -> bool {
    state
      .last_write
      .map(|t| t.elapsed() >= throttle)
      .unwrap_or(true)
  }

  fn write_pending(&self, state: &mut ThrottleState) {
    let Some(blob) = state.pending.take() else {
      return;
    };
    state.last_write = Some(Instant::now());

    let json = match serde_json::to_string(&blob) {
      Ok(json) => json,
      Err(e) => {
        warn!("Failed to serialize cache: {}", e);
        return;
      }
    };

    match self.storage.set_item(&self.options.key, &json) {
      Ok(()) => debug!(
        queries = blob.queries.len(),
        bytes = json.len(),
        "Persisted cache"
      ),
      Err(e) => warn!("Failed to persist cache, continuing without: {}", e),
    }
  }
}

/// Build the query cache for a session, restoring the previous one.
///
/// With `persist` off the cache is memory-only and storage is not touched.
pub fn persist_query_cache(
  config: &CacheConfig,
  storage: Arc<dyn LocalStorage>,
  persist: bool,
) -> QueryCache {
  let cache = QueryCache::new(config.stale_time());
  if !persist {
    return cache;
  }

  let persister = Arc::new(CachePersister::new(storage, PersistOptions::from(config)));
  let restored = persister.restore();
  if !restored.is_empty() {
    info!(count = restored.len(), "Hydrated query cache from previous session");
  }
  cache.hydrate(restored);
  cache.with_persister(persister)
}
