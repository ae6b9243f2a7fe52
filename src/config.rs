use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub filters: FiltersConfig,
  #[serde(default)]
  pub ingest: IngestConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  /// Override for the local storage database location
  pub storage_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  pub graphql_path: String,
  /// Per-request timeout. No deadline when unset.
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8000".to_string(),
      graphql_path: "/graphql".to_string(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Persist the query cache between runs
  pub persist: bool,
  /// Local storage key for the persisted cache blob
  pub storage_key: String,
  /// Version string; a mismatch discards the persisted blob
  pub buster: String,
  /// How long fetched data is served without refetching
  pub stale_time_secs: u64,
  /// Maximum age of persisted data that may be restored
  pub max_age_hours: u64,
  /// Minimum gap between two persisted writes
  pub throttle_ms: u64,
  /// Storage quota in bytes
  pub max_storage_bytes: Option<usize>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persist: true,
      storage_key: "dashboard-cache-v1".to_string(),
      buster: "v1".to_string(),
      stale_time_secs: 5 * 60,
      max_age_hours: 24,
      throttle_ms: 1000,
      max_storage_bytes: Some(5 * 1024 * 1024),
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.stale_time_secs)
  }

  pub fn max_age(&self) -> Duration {
    Duration::from_secs(self.max_age_hours * 60 * 60)
  }

  pub fn throttle(&self) -> Duration {
    Duration::from_millis(self.throttle_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay_ms: 1000,
      max_delay_ms: 30_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
  /// First day of recorded sales; used when the date range is unbounded
  pub history_start: NaiveDate,
  pub default_sales_target: u64,
  /// Branches to prefetch when the cache is warmed
  pub prefetch_branches: Vec<String>,
}

impl Default for FiltersConfig {
  fn default() -> Self {
    Self {
      history_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
      default_sales_target: crate::filters::DEFAULT_SALES_TARGET,
      prefetch_branches: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub datasource_name: String,
  pub poll_interval_secs: u64,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      datasource_name: "sales".to_string(),
      poll_interval_secs: 2,
    }
  }
}

impl IngestConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./salescope.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/salescope/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("salescope.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("salescope").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
      return Err(eyre!(
        "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
        config.retry.base_delay_ms,
        config.retry.max_delay_ms
      ));
    }

    Ok(config)
  }
}

/// Directory for the storage database and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("salescope"))
}
