//! Keyed async query for data fetching with stale-response protection.
//!
//! Inspired by TanStack Query's `useQuery`: a `Query<T>` tracks the
//! [`QueryKey`] it currently shows, fetches whenever the key changes, and
//! ignores results that arrive for a key it no longer shows.
//!
//! # Example
//!
//! ```ignore
//! let client = dashboard_client.clone();
//! let mut query = Query::new(move |key: QueryKey, policy| {
//!     let client = client.clone();
//!     async move { client.fetch(&key, policy).await }
//! });
//!
//! // Filters changed
//! query.set_key(QueryKey::new(KpiOperation::BranchPerformance, &filters));
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryStatus::Loading => render_spinner(),
//!     QueryStatus::Success => render_data(query.data()),
//!     QueryStatus::Error => render_error(query.error()),
//!     QueryStatus::Idle => {}
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::ApiError;
use crate::cache::{FetchPolicy, QueryKey};

/// Where a query stands, for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// No key set yet
  Idle,
  /// A fetch for the current key is in flight
  Loading,
  /// The last fetch for the current key succeeded
  Success,
  /// The last fetch for the current key failed
  Error,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

type FetcherFn<T> = Box<dyn Fn(QueryKey, FetchPolicy) -> BoxFuture<T> + Send + Sync>;

/// A completed fetch: which request it answers and its outcome.
struct Response<T> {
  generation: u64,
  key: QueryKey,
  result: Result<T, ApiError>,
}

/// Async query bound to a [`QueryKey`].
///
/// - `data` survives refetches of the same key and is cleared on a key change
/// - only the most recent fetch for the current key is applied
pub struct Query<T> {
  key: Option<QueryKey>,
  data: Option<T>,
  error: Option<ApiError>,
  loading: bool,
  fetched_at: Option<Instant>,
  fetcher: FetcherFn<T>,
  /// Incremented per fetch; responses from older fetches are dropped
  generation: u64,
  sender: mpsc::UnboundedSender<Response<T>>,
  receiver: mpsc::UnboundedReceiver<Response<T>>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a query with the given fetcher.
  ///
  /// The fetcher is called with the current key each time a fetch starts.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn(QueryKey, FetchPolicy) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      key: None,
      data: None,
      error: None,
      loading: false,
      fetched_at: None,
      fetcher: Box::new(move |key, policy| Box::pin(fetcher(key, policy))),
      generation: 0,
      sender,
      receiver,
    }
  }

  pub fn key(&self) -> Option<&QueryKey> {
    self.key.as_ref()
  }

  pub fn state(&self) -> QueryStatus {
    if self.loading {
      QueryStatus::Loading
    } else if self.error.is_some() {
      QueryStatus::Error
    } else if self.data.is_some() {
      QueryStatus::Success
    } else {
      QueryStatus::Idle
    }
  }

  /// Latest data for the current key, kept while a refetch is loading.
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  /// When data for the current key last arrived.
  pub fn fetched_at(&self) -> Option<Instant> {
    self.fetched_at
  }

  /// Point the query at `key`. Starts a fetch unless the key is unchanged.
  ///
  /// Returns whether the key changed.
  pub fn set_key(&mut self, key: QueryKey) -> bool {
    if self.key.as_ref() == Some(&key) {
      return false;
    }
    debug!(key = %key, "query key changed");
    self.key = Some(key);
    self.data = None;
    self.error = None;
    self.fetched_at = None;
    self.start_fetch(FetchPolicy::CacheFirst);
    true
  }

  /// Fetch the current key unless a fetch is already running.
  pub fn fetch(&mut self) {
    if self.loading {
      return;
    }
    self.start_fetch(FetchPolicy::CacheFirst);
  }

  /// Fetch the current key again, superseding any running fetch.
  pub fn refetch(&mut self) {
    self.start_fetch(FetchPolicy::CacheFirst);
  }

  /// Revalidate: bypass the cache and fetch the current key from the network.
  pub fn mutate(&mut self) {
    self.start_fetch(FetchPolicy::NetworkOnly);
  }

  /// Apply finished fetches. Non-blocking.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(response) = self.receiver.try_recv() {
      if self.key.as_ref() != Some(&response.key) || response.generation != self.generation {
        debug!(key = %response.key, "discarding superseded response");
        continue;
      }

      self.loading = false;
      match response.result {
        Ok(data) => {
          self.data = Some(data);
          self.error = None;
          self.fetched_at = Some(Instant::now());
        }
        Err(error) => {
          self.error = Some(error);
        }
      }
      changed = true;
    }
    changed
  }

  fn start_fetch(&mut self, policy: FetchPolicy) {
    let Some(key) = self.key.clone() else {
      return;
    };
    self.generation += 1;
    self.loading = true;

    let generation = self.generation;
    let sender = self.sender.clone();
    let future = (self.fetcher)(key.clone(), policy);
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - the query may have been dropped
      let _ = sender.send(Response {
        generation,
        key,
        result,
      });
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("data", &self.data)
      .field("error", &self.error)
      .field("loading", &self.loading)
      .finish_non_exhaustive()
  }
}
