use chrono::{Local, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::graphql;
use super::operations::Transport;
use super::retry::RetryPolicy;
use super::types::{IngestStatus, IngestTask};
use super::ApiError;
use crate::cache::{NormalizedFilters, QueryKey};
use crate::config::Config;
use crate::filters::DateRange;

const UPLOAD_PATH: &str = "/api/ingest/upload";
const STATUS_PATH: &str = "/api/ingest/status";

/// KPI backend client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  graphql_url: Url,
  retry: RetryPolicy,
  /// Lower bound sent for unbounded ranges on page queries
  history_start: NaiveDate,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.api.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let mut base = config.api.base_url.trim().to_string();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API url '{}': {}", config.api.base_url, e))?;
    let graphql_url = base_url
      .join(config.api.graphql_path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid GraphQL path '{}': {}", config.api.graphql_path, e))?;

    Ok(Self {
      http,
      base_url,
      graphql_url,
      retry: RetryPolicy::from_config(&config.retry),
      history_start: config.filters.history_start,
    })
  }

  #[cfg(test)]
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::Io(format!("invalid endpoint {}: {}", path, e)))
  }

  /// Run the request behind `key`, retrying transient failures.
  pub async fn execute(&self, key: &QueryKey) -> Result<Value, ApiError> {
    let label = key.description();
    match key.operation.transport() {
      Transport::Rest { path } => {
        let url = self.endpoint(path)?;
        let params = rest_params(&key.filters);
        self
          .retry
          .run(&label, || self.get_json::<Value>(url.clone(), &params, path))
          .await
      }
      Transport::GraphQl { document } => {
        let body = json!({
          "operationName": graphql::operation_name(document).unwrap_or(key.operation.name()),
          "query": document,
          "variables": self.graphql_variables(&key.filters, Local::now().date_naive())?,
        });
        self.retry.run(&label, || self.post_graphql(&body)).await
      }
    }
  }

  /// Upload a data file for ingestion. Never retried.
  pub async fn upload(&self, file: &Path, datasource_name: &str) -> Result<IngestTask, ApiError> {
    let bytes = tokio::fs::read(file)
      .await
      .map_err(|e| ApiError::Io(format!("Failed to read {}: {}", file.display(), e)))?;
    let file_name = file
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "upload".to_string());

    info!(file = %file_name, bytes = bytes.len(), "Uploading data file");
    let form = Form::new()
      .part("file", Part::bytes(bytes).file_name(file_name))
      .text("datasource_name", datasource_name.to_string());

    let response = self
      .http
      .post(self.endpoint(UPLOAD_PATH)?)
      .multipart(form)
      .send()
      .await?;
    decode(response, UPLOAD_PATH).await
  }

  /// Current state of an ingestion task.
  pub async fn ingest_status(&self, task_id: &str) -> Result<IngestStatus, ApiError> {
    let path = format!("{}/{}", STATUS_PATH, task_id);
    let url = self.endpoint(&path)?;
    self
      .retry
      .run(&format!("ingest status {}", task_id), || {
        self.get_json::<IngestStatus>(url.clone(), &[], &path)
      })
      .await
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    url: Url,
    params: &[(&'static str, String)],
    path: &str,
  ) -> Result<T, ApiError> {
    debug!(%url, ?params, "GET");
    let response = self.http.get(url).query(params).send().await?;
    decode(response, path).await
  }

  async fn post_graphql(&self, body: &Value) -> Result<Value, ApiError> {
    debug!(operation = %body["operationName"], "POST graphql");
    let response = self
      .http
      .post(self.graphql_url.clone())
      .json(body)
      .send()
      .await?;
    let envelope: GraphQlResponse = decode(response, self.graphql_url.path()).await?;

    if !envelope.errors.is_empty() {
      return Err(ApiError::GraphQl(
        envelope.errors.into_iter().map(|e| e.message).collect(),
      ));
    }
    match envelope.data {
      Some(Value::Null) | None => Err(ApiError::Decode("response carried no data".to_string())),
      Some(data) => Ok(data),
    }
  }

  fn graphql_variables(&self, filters: &NormalizedFilters, today: NaiveDate) -> Result<Value, ApiError> {
    let range = DateRange::new(filters.start_date, filters.end_date)
      .map_err(|e| ApiError::Io(e.to_string()))?;
    let (start, end) = range.resolve(self.history_start, today);

    let mut vars = Map::new();
    vars.insert("startDate".into(), json!(start.to_string()));
    vars.insert("endDate".into(), json!(end.to_string()));
    if let Some(branch) = filters.branch.name() {
      vars.insert("branch".into(), json!(branch));
    }
    if let Some(line) = filters.product_line.name() {
      vars.insert("productLine".into(), json!(line));
    }
    if !filters.item_groups.is_empty() {
      vars.insert("itemGroups".into(), json!(filters.item_groups));
    }
    if let Some(target) = filters.target {
      vars.insert("target".into(), json!(target));
    }
    Ok(Value::Object(vars))
  }
}

#[derive(serde::Deserialize)]
struct GraphQlResponse {
  data: Option<Value>,
  #[serde(default)]
  errors: Vec<GraphQlError>,
}

#[derive(serde::Deserialize)]
struct GraphQlError {
  message: String,
}

/// Query string for a REST section request. `All` selections are omitted.
fn rest_params(filters: &NormalizedFilters) -> Vec<(&'static str, String)> {
  let mut params = Vec::new();
  if let Some(start) = filters.start_date {
    params.push(("start_date", start.to_string()));
  }
  if let Some(end) = filters.end_date {
    params.push(("end_date", end.to_string()));
  }
  if let Some(branch) = filters.branch.name() {
    params.push(("branch", branch.to_string()));
  }
  if let Some(line) = filters.product_line.name() {
    params.push(("product_line", line.to_string()));
  }
  if !filters.item_groups.is_empty() {
    params.push(("item_groups", filters.item_groups.join(",")));
  }
  if let Some(target) = filters.target {
    params.push(("target", target.to_string()));
  }
  params
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T, ApiError> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    return Err(ApiError::from_status(status, path, body));
  }
  let bytes = response.bytes().await?;
  Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::KpiOperation;
  use crate::cache::KpiFilters;
  use wiremock::matchers::{
    body_partial_json, body_string_contains, method, path, query_param, query_param_is_missing,
  };
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client(server: &MockServer) -> ApiClient {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    ApiClient::new(&config).unwrap().with_retry(RetryPolicy {
      max_retries: 3,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(5),
    })
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[tokio::test]
  async fn test_rest_sends_filters_as_query_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/branch-performance"))
      .and(query_param("start_date", "2024-01-01"))
      .and(query_param("end_date", "2024-01-31"))
      .and(query_param("branch", "Nairobi"))
      .and(query_param("item_groups", "Dairy,Snacks"))
      .and(query_param_is_missing("product_line"))
      .and(query_param_is_missing("target"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(1)
      .mount(&server)
      .await;

    let key = QueryKey::new(
      KpiOperation::BranchPerformance,
      &KpiFilters {
        start_date: Some(date(2024, 1, 1)),
        end_date: Some(date(2024, 1, 31)),
        branch: Some("Nairobi".into()),
        product_line: Some("all".into()),
        item_groups: vec!["Snacks".into(), "Dairy".into()],
        target: Some(500),
      },
    );
    let value = client(&server).execute(&key).await.unwrap();
    assert_eq!(value, json!([]));
  }

  #[tokio::test]
  async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/revenue-summary"))
      .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
      .expect(4)
      .mount(&server)
      .await;

    let key = QueryKey::new(KpiOperation::RevenueSummary, &KpiFilters::default());
    let err = client(&server).execute(&key).await.unwrap_err();
    assert_eq!(
      err,
      ApiError::Http {
        status: 500,
        body: "boom".into()
      }
    );
  }

  #[tokio::test]
  async fn test_not_found_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/product-analytics"))
      .respond_with(ResponseTemplate::new(404))
      .expect(1)
      .mount(&server)
      .await;

    let key = QueryKey::new(KpiOperation::ProductAnalytics, &KpiFilters::default());
    let err = client(&server).execute(&key).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
  }

  #[tokio::test]
  async fn test_graphql_page_resolves_unbounded_dates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/graphql"))
      .and(body_partial_json(json!({
        "operationName": "ProductsPageData",
        "variables": {"startDate": "2020-01-01", "productLine": "Beverages"}
      })))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"data": {"product_analytics": []}})),
      )
      .expect(1)
      .mount(&server)
      .await;

    let key = QueryKey::new(
      KpiOperation::ProductsPageData,
      &KpiFilters {
        product_line: Some("Beverages".into()),
        ..KpiFilters::default()
      },
    );
    let value = client(&server).execute(&key).await.unwrap();
    assert_eq!(value, json!({"product_analytics": []}));
  }

  #[tokio::test]
  async fn test_graphql_errors_are_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/graphql"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": null,
        "errors": [{"message": "unknown branch"}]
      })))
      .mount(&server)
      .await;

    let key = QueryKey::new(KpiOperation::DashboardData, &KpiFilters::default());
    let err = client(&server)
      .with_retry(RetryPolicy::none())
      .execute(&key)
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::GraphQl(vec!["unknown branch".into()]));
  }

  #[tokio::test]
  async fn test_upload_sends_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/ingest/upload"))
      .and(body_string_contains("name=\"datasource_name\""))
      .and(body_string_contains("branch,total"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-42"})))
      .expect(1)
      .mount(&server)
      .await;

    let dir = std::env::temp_dir().join(format!("salescope-upload-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("sales.csv");
    std::fs::write(&file, "branch,total\nNairobi,10\n").unwrap();

    let task = client(&server).upload(&file, "sales").await.unwrap();
    assert_eq!(task.task_id, "t-42");
    std::fs::remove_dir_all(&dir).ok();
  }

  #[tokio::test]
  async fn test_missing_upload_file_is_io_error() {
    let server = MockServer::start().await;
    let err = client(&server)
      .upload(Path::new("/definitely/not/here.csv"), "sales")
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Io(_)));
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_ingest_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/ingest/status/t-42"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "task_id": "t-42",
        "status": "running"
      })))
      .mount(&server)
      .await;

    let status = client(&server).ingest_status("t-42").await.unwrap();
    assert_eq!(status.status, crate::api::IngestState::Running);
  }
}
