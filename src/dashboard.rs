//! Cache-first access to KPI data.
//!
//! Every request goes through the shared [`QueryCache`], so two views asking
//! for the same normalized key within the stale window share one network
//! call. Pages are read either as one GraphQL query or as one REST request
//! per section, depending on the [`DataMode`].

use futures::future::{join_all, try_join_all};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::api::{
  ApiClient, ApiError, BranchesPage, DashboardPage, KpiOperation, ProductsPage, SalespeoplePage,
};
use crate::cache::{CacheResult, CacheSource, FetchPolicy, KpiFilters, QueryCache, QueryKey};
use crate::preferences::DataMode;

/// A page payload made of several KPI sections.
pub trait PageData: DeserializeOwned + Send + 'static {
  /// Named GraphQL query returning the whole page
  const OPERATION: KpiOperation;
  /// REST sections the page is assembled from
  const SECTIONS: &'static [KpiOperation];
}

impl PageData for DashboardPage {
  const OPERATION: KpiOperation = KpiOperation::DashboardData;
  const SECTIONS: &'static [KpiOperation] = &[
    KpiOperation::RevenueSummary,
    KpiOperation::MonthlySalesGrowth,
    KpiOperation::BranchPerformance,
  ];
}

impl PageData for ProductsPage {
  const OPERATION: KpiOperation = KpiOperation::ProductsPageData;
  const SECTIONS: &'static [KpiOperation] = &[KpiOperation::ProductAnalytics];
}

impl PageData for BranchesPage {
  const OPERATION: KpiOperation = KpiOperation::BranchesPageData;
  const SECTIONS: &'static [KpiOperation] = &[
    KpiOperation::BranchPerformance,
    KpiOperation::BranchProductHeatmap,
  ];
}

impl PageData for SalespeoplePage {
  const OPERATION: KpiOperation = KpiOperation::SalespeoplePageData;
  const SECTIONS: &'static [KpiOperation] = &[KpiOperation::SalespersonPerformance];
}

/// KPI client with transparent caching.
#[derive(Clone)]
pub struct DashboardClient {
  api: ApiClient,
  cache: QueryCache,
  mode: Arc<RwLock<DataMode>>,
}

impl DashboardClient {
  pub fn new(api: ApiClient, cache: QueryCache, mode: DataMode) -> Self {
    Self {
      api,
      cache,
      mode: Arc::new(RwLock::new(mode)),
    }
  }

  pub fn api(&self) -> &ApiClient {
    &self.api
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  pub fn data_mode(&self) -> DataMode {
    *self.mode.read().unwrap_or_else(|e| e.into_inner())
  }

  pub fn set_data_mode(&self, mode: DataMode) {
    *self.mode.write().unwrap_or_else(|e| e.into_inner()) = mode;
  }

  /// Raw payload for `key`.
  pub async fn fetch(
    &self,
    key: &QueryKey,
    policy: FetchPolicy,
  ) -> Result<CacheResult<Value>, ApiError> {
    let api = self.api.clone();
    let request = key.clone();
    self
      .cache
      .fetch(key, policy, move || async move { api.execute(&request).await })
      .await
  }

  /// Payload for `key`, decoded.
  pub async fn fetch_as<T: DeserializeOwned>(
    &self,
    key: &QueryKey,
    policy: FetchPolicy,
  ) -> Result<CacheResult<T>, ApiError> {
    let result = self.fetch(key, policy).await?;
    let data = serde_json::from_value(result.data)?;
    Ok(CacheResult {
      data,
      source: result.source,
      cached_at: result.cached_at,
    })
  }

  /// Identity of page `P` for `filters`, independent of the data mode.
  pub fn page_key<P: PageData>(filters: &KpiFilters) -> QueryKey {
    QueryKey::new(P::OPERATION, filters)
  }

  /// Cache keys that hold page `P` in the current data mode.
  pub fn keys_for<P: PageData>(&self, filters: &KpiFilters) -> Vec<QueryKey> {
    match self.data_mode() {
      DataMode::GraphQl => vec![QueryKey::new(P::OPERATION, filters)],
      DataMode::Rest => P::SECTIONS
        .iter()
        .map(|op| QueryKey::new(*op, filters))
        .collect(),
    }
  }

  /// Page `P` for `filters`.
  pub async fn page<P: PageData>(
    &self,
    filters: &KpiFilters,
    policy: FetchPolicy,
  ) -> Result<CacheResult<P>, ApiError> {
    if self.data_mode() == DataMode::GraphQl {
      return self.fetch_as(&QueryKey::new(P::OPERATION, filters), policy).await;
    }

    let keys = self.keys_for::<P>(filters);
    let results = try_join_all(keys.iter().map(|key| self.fetch(key, policy))).await?;

    let source = combined_source(results.iter().map(|r| r.source));
    let cached_at = results.iter().filter_map(|r| r.cached_at).min();
    let sections: Map<String, Value> = keys
      .iter()
      .zip(results)
      .map(|(key, result)| (key.operation.section_field().to_string(), result.data))
      .collect();

    Ok(CacheResult {
      data: serde_json::from_value(Value::Object(sections))?,
      source,
      cached_at,
    })
  }

  /// Fill the cache for page `P` without decoding it.
  pub async fn prefetch_page<P: PageData>(&self, filters: &KpiFilters) {
    let keys = self.keys_for::<P>(filters);
    debug!(count = keys.len(), page = P::OPERATION.name(), "prefetching");
    join_all(keys.iter().map(|key| {
      let api = self.api.clone();
      let request = key.clone();
      self
        .cache
        .prefetch(key, move || async move { api.execute(&request).await })
    }))
    .await;
  }
}

/// Least fresh source among a page's sections.
fn combined_source(sources: impl Iterator<Item = CacheSource>) -> CacheSource {
  sources.fold(CacheSource::CacheFresh, |acc, source| match (acc, source) {
    (CacheSource::Offline, _) | (_, CacheSource::Offline) => CacheSource::Offline,
    (CacheSource::Network, _) | (_, CacheSource::Network) => CacheSource::Network,
    _ => CacheSource::CacheFresh,
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::api::RetryPolicy;
  use crate::config::Config;
  use chrono::NaiveDate;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  pub(crate) fn test_client(server: &MockServer, mode: DataMode) -> DashboardClient {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    let api = ApiClient::new(&config).unwrap().with_retry(RetryPolicy::none());
    DashboardClient::new(api, QueryCache::new(Duration::from_secs(300)), mode)
  }

  pub(crate) fn january_in(branch: Option<&str>) -> KpiFilters {
    KpiFilters {
      start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
      end_date: NaiveDate::from_ymd_opt(2024, 1, 31),
      branch: branch.map(String::from),
      target: Some(1_000_000),
      ..KpiFilters::default()
    }
  }

  async fn mount_section(server: &MockServer, section: &str, body: Value, branch: Option<&str>) {
    let mock = Mock::given(method("GET"))
      .and(path(format!("/api/kpis/{}", section)))
      .and(query_param("start_date", "2024-01-01"))
      .and(query_param("end_date", "2024-01-31"));
    let mock = match branch {
      Some(b) => mock.and(query_param("branch", b)),
      None => mock.and(query_param_is_missing("branch")),
    };
    mock
      .respond_with(ResponseTemplate::new(200).set_body_json(body))
      .expect(1)
      .mount(server)
      .await;
  }

  async fn mount_dashboard_sections(server: &MockServer, branch: Option<&str>) {
    mount_section(
      server,
      "revenue-summary",
      json!({"total_sales": 1500.0, "gross_profit": 300.0, "transactions": 12, "average_sale": 125.0}),
      branch,
    )
    .await;
    mount_section(
      server,
      "monthly-sales-growth",
      json!([{"month": "2024-01", "sales": 1500.0, "growth_pct": 4.2}]),
      branch,
    )
    .await;
    mount_section(
      server,
      "branch-performance",
      json!([{"branch": "Nairobi", "total_sales": 1500.0, "transactions": 12}]),
      branch,
    )
    .await;
  }

  #[tokio::test]
  async fn test_rest_page_is_assembled_and_cached() {
    let server = MockServer::start().await;
    mount_dashboard_sections(&server, Some("Nairobi")).await;
    let client = test_client(&server, DataMode::Rest);
    let filters = january_in(Some("Nairobi"));

    let first = client
      .page::<DashboardPage>(&filters, FetchPolicy::CacheFirst)
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.revenue_summary.transactions, 12);
    assert_eq!(first.data.branch_performance[0].branch, "Nairobi");

    // Same filters in a different shape: served from cache
    let again = KpiFilters {
      branch: Some(" Nairobi ".into()),
      ..filters
    };
    let second = client
      .page::<DashboardPage>(&again, FetchPolicy::CacheFirst)
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, first.data);
  }

  #[tokio::test]
  async fn test_all_branch_omits_branch_param() {
    let server = MockServer::start().await;
    mount_dashboard_sections(&server, None).await;
    let client = test_client(&server, DataMode::Rest);

    let page = client
      .page::<DashboardPage>(&january_in(Some("all")), FetchPolicy::CacheFirst)
      .await
      .unwrap();
    assert_eq!(page.data.monthly_sales_growth.len(), 1);
  }

  #[tokio::test]
  async fn test_all_branches_entry_is_not_served_for_named_branch() {
    let server = MockServer::start().await;
    mount_section(
      &server,
      "branch-performance",
      json!([{"branch": "Nairobi", "total_sales": 80.0}]),
      Some("Nairobi"),
    )
    .await;
    let client = test_client(&server, DataMode::Rest);

    let all = QueryKey::new(KpiOperation::BranchPerformance, &january_in(Some("all")));
    client
      .cache()
      .set(&all, json!([{"branch": "Mombasa", "total_sales": 500.0}]));

    let nairobi = QueryKey::new(KpiOperation::BranchPerformance, &january_in(Some("Nairobi")));
    let result = client.fetch(&nairobi, FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data[0]["branch"], "Nairobi");
  }

  #[tokio::test]
  async fn test_graphql_mode_uses_one_named_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/graphql"))
      .and(body_partial_json(json!({
        "operationName": "BranchesPageData",
        "variables": {"startDate": "2024-01-01", "endDate": "2024-01-31"}
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": {
          "branch_performance": [{"branch": "Mombasa", "total_sales": 10.0}],
          "branch_product_heatmap": [{"branch": "Mombasa", "product_line": "Dairy", "sales": 10.0}]
        }
      })))
      .expect(1)
      .mount(&server)
      .await;
    let client = test_client(&server, DataMode::GraphQl);

    for _ in 0..2 {
      let page = client
        .page::<BranchesPage>(&january_in(None), FetchPolicy::CacheFirst)
        .await
        .unwrap();
      assert_eq!(page.data.branch_product_heatmap[0].product_line, "Dairy");
    }
  }

  #[test]
  fn test_combined_source_reports_least_fresh() {
    use CacheSource::*;
    assert_eq!(combined_source([CacheFresh, CacheFresh].into_iter()), CacheFresh);
    assert_eq!(combined_source([CacheFresh, Network].into_iter()), Network);
    assert_eq!(combined_source([Network, Offline].into_iter()), Offline);
  }
}
