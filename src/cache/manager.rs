//! Group invalidation and speculative prefetching.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::key::Entity;
use crate::api::{BranchesPage, DashboardPage};
use crate::dashboard::DashboardClient;
use crate::filters::{Branch, FilterState};

/// Invalidation is coarse: it may mark more queries stale than strictly
/// necessary, never fewer.
#[derive(Clone)]
pub struct CacheManager {
  client: DashboardClient,
}

impl CacheManager {
  pub fn new(client: DashboardClient) -> Self {
    Self { client }
  }

  /// Mark every dashboard query stale. Returns how many entries were hit.
  pub fn invalidate_dashboard(&self) -> usize {
    let count = self.client.cache().invalidate_where(|_| true);
    info!(count, "Invalidated dashboard queries");
    count
  }

  /// Mark stale every query whose result may depend on `entity`.
  pub fn invalidate_related_data(&self, entity: Entity) -> usize {
    let count = self
      .client
      .cache()
      .invalidate_where(|key| key.depends_on(entity));
    info!(?entity, count, "Invalidated related queries");
    count
  }

  /// Prefetch the dashboard page for `filters` in the background.
  pub fn warm_cache(&self, filters: &FilterState) -> JoinHandle<()> {
    let client = self.client.clone();
    let params = filters.kpi_filters();
    tokio::spawn(async move {
      client.prefetch_page::<DashboardPage>(&params).await;
    })
  }

  /// Prefetch the dashboard for the months before and after the current range.
  ///
  /// Does nothing for unbounded ranges.
  pub fn prefetch_adjacent_months(&self, filters: &FilterState) -> Vec<JoinHandle<()>> {
    [-1, 1]
      .into_iter()
      .filter_map(|delta| filters.date_range.shift_months(delta))
      .map(|range| {
        let neighbour = FilterState {
          date_range: range,
          ..filters.clone()
        };
        debug!(range = %neighbour.date_range, "Warming adjacent month");
        self.warm_cache(&neighbour)
      })
      .collect()
  }

  /// Prefetch the branches page for each of `branches`.
  pub fn prefetch_branches(&self, filters: &FilterState, branches: &[String]) -> JoinHandle<()> {
    let client = self.client.clone();
    let requests: Vec<_> = branches
      .iter()
      .map(|name| {
        FilterState {
          selected_branch: Branch::parse(Some(name.as_str())),
          ..filters.clone()
        }
        .kpi_filters()
      })
      .collect();

    tokio::spawn(async move {
      for params in requests {
        client.prefetch_page::<BranchesPage>(&params).await;
      }
    })
  }

  /// Drop all cached data, including the persisted copy.
  pub fn clear(&self) {
    let cache = self.client.cache();
    cache.clear();
    if let Some(persister) = cache.persister() {
      persister.reset();
    }
    info!("Cleared query cache");
  }
}
