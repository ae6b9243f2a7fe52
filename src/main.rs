mod api;
mod app;
mod cache;
mod commands;
mod config;
mod dashboard;
mod event;
mod filters;
mod logging;
mod preferences;
mod query;
mod storage;
mod ui;
mod upload;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::dashboard::DashboardClient;
use crate::filters::{parse_date, Branch, DateRange, FilterState, FilterStore, ProductLine};
use crate::preferences::DataMode;
use crate::storage::{LocalStorage, NoopStorage, SqliteStorage};

#[derive(Parser, Debug)]
#[command(name = "salescope")]
#[command(about = "A terminal dashboard for retail sales KPIs")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./salescope.yaml, then $XDG_CONFIG_HOME/salescope/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start filtered to this branch ("all" for every branch)
  #[arg(short, long)]
  branch: Option<String>,

  /// Start filtered to this product line ("all" for every line)
  #[arg(short = 'l', long)]
  product_line: Option<String>,

  /// Range start, YYYY-MM-DD
  #[arg(long)]
  from: Option<String>,

  /// Range end, YYYY-MM-DD
  #[arg(long)]
  to: Option<String>,

  /// Fetch pages through GraphQL instead of REST
  #[arg(long)]
  graphql: bool,

  /// Do not restore or persist the query cache
  #[arg(long)]
  no_cache: bool,

  /// Drop the persisted cache before starting
  #[arg(long)]
  clear_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(&logging::log_dir()?)?;
  info!(version = env!("CARGO_PKG_VERSION"), "Starting salescope");

  // Local storage; persistence is optional
  let storage: Arc<dyn LocalStorage> =
    match SqliteStorage::open(config.storage_path.as_deref(), config.cache.max_storage_bytes) {
      Ok(storage) => Arc::new(storage),
      Err(e) => {
        warn!("Local storage unavailable, running without persistence: {}", e);
        Arc::new(NoopStorage)
      }
    };

  if args.clear_cache {
    match storage.remove_item(&config.cache.storage_key) {
      Ok(()) => info!("Cleared persisted cache"),
      Err(e) => warn!("Failed to clear persisted cache: {}", e),
    }
  }

  let persist = config.cache.persist && !args.no_cache;
  let cache = cache::persist_query_cache(&config.cache, storage.clone(), persist);

  let mode = if args.graphql {
    DataMode::GraphQl
  } else {
    DataMode::load(storage.as_ref())
  };

  let api = ApiClient::new(&config)?;
  let client = DashboardClient::new(api, cache, mode);

  let mut filters = FilterStore::load(
    storage.clone(),
    FilterState::with_target(config.filters.default_sales_target),
  );
  apply_cli_filters(&mut filters, &args)?;

  // Initialize and run the app
  let mut app = app::App::new(config, storage, filters, client);
  app.run().await?;

  Ok(())
}

/// Command-line filters override the persisted ones
fn apply_cli_filters(filters: &mut FilterStore, args: &Args) -> Result<()> {
  if let Some(branch) = &args.branch {
    filters.set_selected_branch(Branch::parse(Some(branch.as_str())));
  }
  if let Some(line) = &args.product_line {
    filters.set_selected_product_line(ProductLine::parse(Some(line.as_str())));
  }

  if args.from.is_some() || args.to.is_some() {
    let bound = |value: &Option<String>| -> Result<_> {
      value
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(|e| eyre!("Invalid date: {}", e))
    };
    let range = DateRange::new(bound(&args.from)?, bound(&args.to)?)
      .map_err(|e| eyre!("Invalid date range: {}", e))?;
    filters.set_date_range(range);
  }
  Ok(())
}
