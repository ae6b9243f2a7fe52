//! In-memory query cache that orchestrates caching logic with network fetching.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use super::key::QueryKey;
use super::persist::CachePersister;
use super::traits::{CacheEntry, CacheResult, FetchPolicy};
use crate::api::ApiError;

/// Shared cache of query results keyed by [`QueryKey`].
///
/// Every read and write goes through a single lock, so callers never observe
/// a half-written entry. The lock is never held across an `.await`. Clones
/// share the same entries.
#[derive(Clone)]
pub struct QueryCache {
  entries: Arc<Mutex<HashMap<QueryKey, CacheEntry>>>,
  /// How long fetched data is served without refetching
  stale_time: chrono::Duration,
  persister: Option<Arc<CachePersister>>,
}

impl QueryCache {
  pub fn new(stale_time: Duration) -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
      stale_time: chrono::Duration::from_std(stale_time).unwrap_or(chrono::Duration::zero()),
      persister: None,
    }
  }

  /// Write every change through to `persister`.
  pub fn with_persister(mut self, persister: Arc<CachePersister>) -> Self {
    self.persister = Some(persister);
    self
  }

  pub fn persister(&self) -> Option<&Arc<CachePersister>> {
    self.persister.as_ref()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
    // A panic while holding the lock cannot leave an entry half-written
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.lock().get(key).cloned()
  }

  /// Whether `key` has an entry that may be served without refetching.
  pub fn is_fresh(&self, key: &QueryKey) -> bool {
    self
      .get(key)
      .map(|entry| !entry.is_stale())
      .unwrap_or(false)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Store freshly fetched data under `key`.
  pub fn set(&self, key: &QueryKey, data: Value) {
    let entry = CacheEntry::new(data, Utc::now(), self.stale_time);
    self.lock().insert(key.clone(), entry);
    self.notify_write();
  }

  fn record_error(&self, key: &QueryKey, error: &ApiError) {
    if let Some(entry) = self.lock().get_mut(key) {
      entry.error = Some(error.to_string());
    }
  }

  /// Mark every entry matching `predicate` as stale. Returns how many matched.
  pub fn invalidate_where(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
    let now = Utc::now();
    let count = {
      let mut entries = self.lock();
      let mut count = 0;
      for (key, entry) in entries.iter_mut() {
        if predicate(key) {
          entry.stale_at = entry.stale_at.min(now);
          count += 1;
        }
      }
      count
    };

    if count > 0 {
      self.notify_write();
    }
    count
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.lock().clear();
    self.notify_write();
  }

  /// Load entries restored from persistent storage.
  pub fn hydrate(&self, restored: Vec<(QueryKey, CacheEntry)>) {
    let mut entries = self.lock();
    for (key, entry) in restored {
      entries.insert(key, entry);
    }
  }

  /// Copy of every entry, for persistence.
  pub fn snapshot(&self) -> Vec<(QueryKey, CacheEntry)> {
    self
      .lock()
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  fn notify_write(&self) {
    if let Some(persister) = &self.persister {
      persister.schedule_with(|| self.snapshot());
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. With [`FetchPolicy::CacheFirst`], a fresh entry is returned immediately
  /// 2. Otherwise fetch from network and store the result
  /// 3. On failure, serve the stale entry if there is one (offline mode),
  ///    except for 404s which are terminal
  pub async fn fetch<F, Fut>(
    &self,
    key: &QueryKey,
    policy: FetchPolicy,
    fetcher: F,
  ) -> Result<CacheResult<Value>, ApiError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, ApiError>>,
  {
    let cached = self.get(key);

    if policy == FetchPolicy::CacheFirst {
      if let Some(entry) = &cached {
        if !entry.is_stale() {
          debug!(key = %key, "cache hit");
          return Ok(CacheResult::from_cache(entry.data.clone(), entry.fetched_at));
        }
      }
    }

    debug!(key = %key, ?policy, "fetching");
    match fetcher().await {
      Ok(data) => {
        self.set(key, data.clone());
        Ok(CacheResult::from_network(data))
      }
      Err(error) => {
        self.record_error(key, &error);
        match cached {
          Some(entry) if error.is_retryable() => {
            warn!(key = %key, "refetch failed, serving stale data: {}", error);
            Ok(CacheResult::offline(entry.data, entry.fetched_at))
          }
          _ => Err(error),
        }
      }
    }
  }

  /// Fetch `key` in the background unless a fresh entry already exists.
  pub async fn prefetch<F, Fut>(&self, key: &QueryKey, fetcher: F)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, ApiError>>,
  {
    if self.is_fresh(key) {
      return;
    }
    if let Err(e) = self.fetch(key, FetchPolicy::CacheFirst, fetcher).await {
      debug!(key = %key, "prefetch failed: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::KpiOperation;
  use crate::cache::{CacheSource, KpiFilters};
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn key(operation: KpiOperation) -> QueryKey {
    QueryKey::new(operation, &KpiFilters::default())
  }

  async fn fetch_counting(
    cache: &QueryCache,
    key: &QueryKey,
    policy: FetchPolicy,
    calls: &AtomicU32,
    result: Result<Value, ApiError>,
  ) -> Result<CacheResult<Value>, ApiError> {
    cache
      .fetch(key, policy, move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        result
      })
      .await
  }

  #[tokio::test]
  async fn test_fresh_entry_served_without_network() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let calls = AtomicU32::new(0);
    let k = key(KpiOperation::BranchPerformance);

    let first = fetch_counting(&cache, &k, FetchPolicy::CacheFirst, &calls, Ok(json!([1])))
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = fetch_counting(&cache, &k, FetchPolicy::CacheFirst, &calls, Ok(json!([2])))
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, json!([1]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_network_only_bypasses_fresh_entry() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let calls = AtomicU32::new(0);
    let k = key(KpiOperation::BranchPerformance);

    fetch_counting(&cache, &k, FetchPolicy::CacheFirst, &calls, Ok(json!(1)))
      .await
      .unwrap();
    let result = fetch_counting(&cache, &k, FetchPolicy::NetworkOnly, &calls, Ok(json!(2)))
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(cache.get(&k).unwrap().data, json!(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_zero_stale_time_always_refetches() {
    let cache = QueryCache::new(Duration::ZERO);
    let calls = AtomicU32::new(0);
    let k = key(KpiOperation::RevenueSummary);

    for _ in 0..3 {
      fetch_counting(&cache, &k, FetchPolicy::CacheFirst, &calls, Ok(json!({})))
        .await
        .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_failed_refetch_serves_stale_data() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let calls = AtomicU32::new(0);
    let k = key(KpiOperation::ProductAnalytics);

    fetch_counting(&cache, &k, FetchPolicy::CacheFirst, &calls, Ok(json!(["old"])))
      .await
      .unwrap();
    cache.invalidate_where(|_| true);

    let result = fetch_counting(
      &cache,
      &k,
      FetchPolicy::CacheFirst,
      &calls,
      Err(ApiError::Network("connection refused".into())),
    )
    .await
    .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, json!(["old"]));
    assert!(cache.get(&k).unwrap().error.is_some());
  }

  #[tokio::test]
  async fn test_not_found_is_not_masked_by_stale_data() {
    let cache = QueryCache::new(Duration::ZERO);
    let calls = AtomicU32::new(0);
    let k = key(KpiOperation::ProductAnalytics);

    fetch_counting(&cache, &k, FetchPolicy::CacheFirst, &calls, Ok(json!([])))
      .await
      .unwrap();
    let err = fetch_counting(
      &cache,
      &k,
      FetchPolicy::CacheFirst,
      &calls,
      Err(ApiError::NotFound("/api/kpis/product-analytics".into())),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
  }

  #[tokio::test]
  async fn test_error_without_cache_propagates() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let calls = AtomicU32::new(0);
    let k = key(KpiOperation::RevenueSummary);

    let result = fetch_counting(
      &cache,
      &k,
      FetchPolicy::CacheFirst,
      &calls,
      Err(ApiError::Http {
        status: 500,
        body: "boom".into(),
      }),
    )
    .await;
    assert!(result.is_err());
    assert!(cache.is_empty());
  }

  #[tokio::test]
  async fn test_invalidate_where_only_touches_matches() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let branch = key(KpiOperation::BranchPerformance);
    let product = key(KpiOperation::ProductAnalytics);
    cache.set(&branch, json!(1));
    cache.set(&product, json!(2));

    let count = cache.invalidate_where(|k| k.operation == KpiOperation::BranchPerformance);
    assert_eq!(count, 1);
    assert!(!cache.is_fresh(&branch));
    assert!(cache.is_fresh(&product));
  }

  #[tokio::test]
  async fn test_prefetch_skips_fresh_entries() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let k = key(KpiOperation::DashboardData);

    for _ in 0..2 {
      cache
        .prefetch(&k, move || async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(json!({}))
        })
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
