//! Serde types matching the KPI backend responses.
//!
//! REST endpoints and the aliased GraphQL page queries share these shapes, so
//! a page decodes the same way in either data mode.

use serde::{Deserialize, Serialize};

// ============================================================================
// Section records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueSummary {
  #[serde(default)]
  pub total_sales: f64,
  #[serde(default)]
  pub gross_profit: f64,
  #[serde(default)]
  pub transactions: u64,
  #[serde(default)]
  pub average_sale: f64,
  /// Share of the sales target reached, when a target was sent
  #[serde(default)]
  pub target_achievement_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySales {
  /// `YYYY-MM`
  pub month: String,
  pub sales: f64,
  #[serde(default)]
  pub growth_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchPerformance {
  pub branch: String,
  pub total_sales: f64,
  #[serde(default)]
  pub transactions: u64,
  #[serde(default)]
  pub average_sale: f64,
  #[serde(default)]
  pub growth_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPerformance {
  pub product: String,
  #[serde(default)]
  pub product_line: Option<String>,
  #[serde(default)]
  pub units_sold: u64,
  pub revenue: f64,
  #[serde(default)]
  pub margin_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalespersonPerformance {
  pub salesperson: String,
  #[serde(default)]
  pub branch: Option<String>,
  pub total_sales: f64,
  #[serde(default)]
  pub deals: u64,
  #[serde(default)]
  pub target_achievement_pct: Option<f64>,
}

/// One cell of the branch × product line matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
  pub branch: String,
  pub product_line: String,
  pub sales: f64,
}

// ============================================================================
// Page aggregates
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardPage {
  #[serde(default)]
  pub revenue_summary: RevenueSummary,
  #[serde(default)]
  pub monthly_sales_growth: Vec<MonthlySales>,
  #[serde(default)]
  pub branch_performance: Vec<BranchPerformance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductsPage {
  #[serde(default)]
  pub product_analytics: Vec<ProductPerformance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchesPage {
  #[serde(default)]
  pub branch_performance: Vec<BranchPerformance>,
  #[serde(default)]
  pub branch_product_heatmap: Vec<HeatmapCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalespeoplePage {
  #[serde(default)]
  pub salesperson_performance: Vec<SalespersonPerformance>,
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestTask {
  pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestState {
  #[serde(alias = "queued")]
  Pending,
  #[serde(alias = "processing")]
  Running,
  #[serde(alias = "success", alias = "completed")]
  Succeeded,
  #[serde(alias = "error")]
  Failed,
}

impl IngestState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, IngestState::Succeeded | IngestState::Failed)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestStatus {
  pub task_id: String,
  pub status: IngestState,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub rows_ingested: Option<u64>,
}
