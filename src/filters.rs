//! Global dashboard filters.
//!
//! Every view reads the same [`FilterState`]: a date range, a branch, a
//! product line and a sales target. [`FilterStore`] owns the state, writes it
//! to local storage on every change and restores it on startup.

use chrono::{DateTime, Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::KpiFilters;
use crate::storage::{LocalStorage, FILTERS_KEY};

pub const DEFAULT_SALES_TARGET: u64 = 1_000_000;

/// Sentinel used on the wire and in persisted state for "no selection".
const ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
  #[error("date range start {start} is after end {end}")]
  InvertedRange { start: NaiveDate, end: NaiveDate },
  #[error("invalid date '{0}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
  InvalidDate(String),
  #[error("invalid sales target '{0}'")]
  InvalidTarget(String),
}

/// Parse a date given either as `YYYY-MM-DD` or as a full timestamp.
pub fn parse_date(s: &str) -> Result<NaiveDate, FilterError> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
    .map_err(|_| FilterError::InvalidDate(s.to_string()))
}

// ============================================================================
// Date range
// ============================================================================

/// Inclusive date range. Missing bounds mean "from the beginning" / "up to now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct DateRange {
  start: Option<NaiveDate>,
  end: Option<NaiveDate>,
}

/// Persisted form: `[start | null, end | null]`
#[derive(Serialize, Deserialize)]
struct RawRange(Option<String>, Option<String>);

impl TryFrom<RawRange> for DateRange {
  type Error = FilterError;

  fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
    let start = raw.0.as_deref().map(parse_date).transpose()?;
    let end = raw.1.as_deref().map(parse_date).transpose()?;
    DateRange::new(start, end)
  }
}

impl From<DateRange> for RawRange {
  fn from(range: DateRange) -> Self {
    RawRange(
      range.start.map(|d| d.to_string()),
      range.end.map(|d| d.to_string()),
    )
  }
}

impl DateRange {
  pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, FilterError> {
    if let (Some(s), Some(e)) = (start, end) {
      if s > e {
        return Err(FilterError::InvertedRange { start: s, end: e });
      }
    }
    Ok(Self { start, end })
  }

  /// Unbounded range covering all recorded history.
  pub fn full_history() -> Self {
    Self::default()
  }

  /// The calendar month containing `date`.
  pub fn month_of(date: NaiveDate) -> Self {
    let start = date.with_day(1).unwrap_or(date);
    let end = start
      .checked_add_months(Months::new(1))
      .and_then(|next| next.pred_opt())
      .unwrap_or(start);
    Self {
      start: Some(start),
      end: Some(end),
    }
  }

  pub fn start(&self) -> Option<NaiveDate> {
    self.start
  }

  pub fn end(&self) -> Option<NaiveDate> {
    self.end
  }

  pub fn is_full_history(&self) -> bool {
    self.start.is_none() && self.end.is_none()
  }

  /// Whether the range covers exactly one calendar month.
  pub fn is_whole_month(&self) -> bool {
    match self.start {
      Some(start) => Self::month_of(start) == *self,
      None => false,
    }
  }

  /// Move the range by `delta` calendar months.
  ///
  /// Whole-month ranges stay whole months (Feb keeps its 28/29 days).
  /// Returns `None` for unbounded ranges or on date overflow.
  pub fn shift_months(&self, delta: i32) -> Option<Self> {
    if self.is_full_history() {
      return None;
    }
    if self.is_whole_month() {
      let start = shift_date(self.start?, delta)?;
      return Some(Self::month_of(start));
    }

    let start = match self.start {
      Some(d) => Some(shift_date(d, delta)?),
      None => None,
    };
    let end = match self.end {
      Some(d) => Some(shift_date(d, delta)?),
      None => None,
    };
    Self::new(start, end).ok()
  }

  /// Concrete bounds for queries that require both dates.
  pub fn resolve(&self, history_start: NaiveDate, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = self.start.unwrap_or(history_start);
    let end = self.end.unwrap_or(today).max(start);
    (start, end)
  }
}

fn shift_date(date: NaiveDate, delta: i32) -> Option<NaiveDate> {
  let months = Months::new(delta.unsigned_abs());
  if delta >= 0 {
    date.checked_add_months(months)
  } else {
    date.checked_sub_months(months)
  }
}

impl fmt::Display for DateRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.start, self.end) {
      (None, None) => write!(f, "all time"),
      (Some(s), None) => write!(f, "from {}", s),
      (None, Some(e)) => write!(f, "until {}", e),
      (Some(s), Some(e)) => write!(f, "{} .. {}", s, e),
    }
  }
}

// ============================================================================
// Branch / product line selection
// ============================================================================

/// Selected branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Branch {
  #[default]
  All,
  Named(String),
}

impl Branch {
  /// Missing, blank and `"all"` (any case) all mean every branch.
  pub fn parse(value: Option<&str>) -> Self {
    match value.map(str::trim) {
      None => Branch::All,
      Some(v) if v.is_empty() || v.eq_ignore_ascii_case(ALL) => Branch::All,
      Some(v) => Branch::Named(v.to_string()),
    }
  }

  pub fn name(&self) -> Option<&str> {
    match self {
      Branch::All => None,
      Branch::Named(name) => Some(name),
    }
  }
}

impl From<Option<String>> for Branch {
  fn from(value: Option<String>) -> Self {
    Branch::parse(value.as_deref())
  }
}

impl From<Branch> for String {
  fn from(branch: Branch) -> Self {
    match branch {
      Branch::All => ALL.to_string(),
      Branch::Named(name) => name,
    }
  }
}

impl fmt::Display for Branch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Branch::All => write!(f, "All branches"),
      Branch::Named(name) => write!(f, "{}", name),
    }
  }
}

/// Selected product line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ProductLine {
  #[default]
  All,
  Named(String),
}

impl ProductLine {
  pub fn parse(value: Option<&str>) -> Self {
    match value.map(str::trim) {
      None => ProductLine::All,
      Some(v) if v.is_empty() || v.eq_ignore_ascii_case(ALL) => ProductLine::All,
      Some(v) => ProductLine::Named(v.to_string()),
    }
  }

  pub fn name(&self) -> Option<&str> {
    match self {
      ProductLine::All => None,
      ProductLine::Named(name) => Some(name),
    }
  }
}

impl From<Option<String>> for ProductLine {
  fn from(value: Option<String>) -> Self {
    ProductLine::parse(value.as_deref())
  }
}

impl From<ProductLine> for String {
  fn from(line: ProductLine) -> Self {
    match line {
      ProductLine::All => ALL.to_string(),
      ProductLine::Named(name) => name,
    }
  }
}

impl fmt::Display for ProductLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProductLine::All => write!(f, "All product lines"),
      ProductLine::Named(name) => write!(f, "{}", name),
    }
  }
}

// ============================================================================
// Sales target
// ============================================================================

/// Sales target used for achievement percentages.
///
/// Stored as a string; numbers are accepted when reading older state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "String")]
pub struct SalesTarget(u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
  Number(u64),
  Text(String),
}

impl TryFrom<RawTarget> for SalesTarget {
  type Error = FilterError;

  fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
    match raw {
      RawTarget::Number(n) => Ok(SalesTarget(n)),
      RawTarget::Text(s) => SalesTarget::parse(&s),
    }
  }
}

impl From<SalesTarget> for String {
  fn from(target: SalesTarget) -> Self {
    target.0.to_string()
  }
}

impl SalesTarget {
  pub fn new(value: u64) -> Self {
    Self(value)
  }

  /// Parse user input such as `"1500000"` or `"1,500,000"`.
  pub fn parse(s: &str) -> Result<Self, FilterError> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    cleaned
      .parse::<u64>()
      .map(SalesTarget)
      .map_err(|_| FilterError::InvalidTarget(s.to_string()))
  }

  pub fn value(&self) -> u64 {
    self.0
  }
}

impl Default for SalesTarget {
  fn default() -> Self {
    Self(DEFAULT_SALES_TARGET)
  }
}

// ============================================================================
// Filter state
// ============================================================================

/// The global filters shared by every dashboard view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
  pub date_range: DateRange,
  pub selected_branch: Branch,
  pub selected_product_line: ProductLine,
  pub sales_target: SalesTarget,
}

impl FilterState {
  /// Default filters with a configured sales target.
  pub fn with_target(target: u64) -> Self {
    Self {
      sales_target: SalesTarget::new(target),
      ..Self::default()
    }
  }

  /// Start bound as `YYYY-MM-DD`.
  pub fn start_date_param(&self) -> Option<String> {
    self.date_range.start().map(|d| d.format("%Y-%m-%d").to_string())
  }

  /// End bound as `YYYY-MM-DD`.
  pub fn end_date_param(&self) -> Option<String> {
    self.date_range.end().map(|d| d.format("%Y-%m-%d").to_string())
  }

  /// Request parameters for these filters.
  pub fn kpi_filters(&self) -> KpiFilters {
    KpiFilters {
      start_date: self.date_range.start(),
      end_date: self.date_range.end(),
      branch: self.selected_branch.name().map(String::from),
      product_line: self.selected_product_line.name().map(String::from),
      item_groups: Vec::new(),
      target: Some(self.sales_target.value()),
    }
  }

  /// One-line summary for the header.
  pub fn summary(&self) -> String {
    format!(
      "{} | {} | {} | target {}",
      self.date_range, self.selected_branch, self.selected_product_line, self.sales_target.0
    )
  }
}

/// Owner of the global filter state.
///
/// Every setter writes the full state back to local storage. Storage
/// failures are logged and otherwise ignored.
pub struct FilterStore {
  state: FilterState,
  defaults: FilterState,
  storage: Arc<dyn LocalStorage>,
}

impl FilterStore {
  /// Restore persisted filters, falling back to `defaults` on any problem.
  pub fn load(storage: Arc<dyn LocalStorage>, defaults: FilterState) -> Self {
    let state = match storage.get_item(FILTERS_KEY) {
      Ok(Some(json)) => match serde_json::from_str::<FilterState>(&json) {
        Ok(state) => {
          debug!(filters = %state.summary(), "Restored persisted filters");
          state
        }
        Err(e) => {
          warn!("Ignoring unreadable persisted filters: {}", e);
          defaults.clone()
        }
      },
      Ok(None) => defaults.clone(),
      Err(e) => {
        warn!("Could not read persisted filters: {}", e);
        defaults.clone()
      }
    };

    Self {
      state,
      defaults,
      storage,
    }
  }

  pub fn state(&self) -> &FilterState {
    &self.state
  }

  pub fn set_date_range(&mut self, range: DateRange) {
    self.state.date_range = range;
    self.persist();
  }

  pub fn set_selected_branch(&mut self, branch: Branch) {
    self.state.selected_branch = branch;
    self.persist();
  }

  pub fn set_selected_product_line(&mut self, product_line: ProductLine) {
    self.state.selected_product_line = product_line;
    self.persist();
  }

  pub fn set_sales_target(&mut self, target: SalesTarget) {
    self.state.sales_target = target;
    self.persist();
  }

  /// Move the date range by whole months. No-op for an unbounded range.
  pub fn shift_month(&mut self, delta: i32) -> bool {
    match self.state.date_range.shift_months(delta) {
      Some(range) => {
        self.set_date_range(range);
        true
      }
      None => false,
    }
  }

  pub fn reset_filters(&mut self) {
    self.state = self.defaults.clone();
    self.persist();
  }

  fn persist(&self) {
    let json = match serde_json::to_string(&self.state) {
      Ok(json) => json,
      Err(e) => {
        warn!("Failed to serialize filters: {}", e);
        return;
      }
    };

    if let Err(e) = self.storage.set_item(FILTERS_KEY, &json) {
      warn!("Failed to persist filters: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::SqliteStorage;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn storage() -> Arc<dyn LocalStorage> {
    Arc::new(SqliteStorage::in_memory(None).unwrap())
  }

  #[test]
  fn test_branch_parse_normalizes_sentinels() {
    assert_eq!(Branch::parse(None), Branch::All);
    assert_eq!(Branch::parse(Some("all")), Branch::All);
    assert_eq!(Branch::parse(Some(" ALL ")), Branch::All);
    assert_eq!(Branch::parse(Some("")), Branch::All);
    assert_eq!(
      Branch::parse(Some(" Nairobi ")),
      Branch::Named("Nairobi".to_string())
    );
  }

  #[test]
  fn test_date_range_rejects_inverted() {
    let err = DateRange::new(Some(date(2024, 2, 1)), Some(date(2024, 1, 1))).unwrap_err();
    assert!(matches!(err, FilterError::InvertedRange { .. }));

    // Open-ended ranges are always valid
    assert!(DateRange::new(Some(date(2024, 2, 1)), None).is_ok());
  }

  #[test]
  fn test_month_shift_keeps_whole_months() {
    let jan = DateRange::month_of(date(2024, 1, 17));
    assert_eq!(jan.start(), Some(date(2024, 1, 1)));
    assert_eq!(jan.end(), Some(date(2024, 1, 31)));

    let feb = jan.shift_months(1).unwrap();
    assert_eq!(feb.end(), Some(date(2024, 2, 29)));

    let dec = jan.shift_months(-1).unwrap();
    assert_eq!(dec.start(), Some(date(2023, 12, 1)));
    assert_eq!(dec.end(), Some(date(2023, 12, 31)));

    assert_eq!(DateRange::full_history().shift_months(1), None);
  }

  #[test]
  fn test_resolve_uses_history_start_and_today() {
    let (s, e) = DateRange::full_history().resolve(date(2020, 1, 1), date(2024, 5, 5));
    assert_eq!((s, e), (date(2020, 1, 1), date(2024, 5, 5)));
  }

  #[test]
  fn test_filter_state_json_shape() {
    let state = FilterState {
      date_range: DateRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 31))).unwrap(),
      selected_branch: Branch::Named("Nairobi".to_string()),
      selected_product_line: ProductLine::All,
      sales_target: SalesTarget::new(250_000),
    };

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "dateRange": ["2024-01-01", "2024-01-31"],
        "selectedBranch": "Nairobi",
        "selectedProductLine": "all",
        "salesTarget": "250000",
      })
    );

    let back: FilterState = serde_json::from_value(json).unwrap();
    assert_eq!(back, state);
  }

  #[test]
  fn test_reads_timestamps_and_numeric_target() {
    let json = r#"{
      "dateRange": ["2024-03-01T00:00:00.000Z", null],
      "selectedBranch": null,
      "selectedProductLine": "Beverages",
      "salesTarget": 500000
    }"#;
    let state: FilterState = serde_json::from_str(json).unwrap();
    assert_eq!(state.date_range.start(), Some(date(2024, 3, 1)));
    assert_eq!(state.date_range.end(), None);
    assert_eq!(state.selected_branch, Branch::All);
    assert_eq!(state.sales_target.value(), 500_000);
  }

  #[test]
  fn test_inverted_persisted_range_is_rejected() {
    let json = r#"{"dateRange":["2024-02-01","2024-01-01"],"selectedBranch":"all",
      "selectedProductLine":"all","salesTarget":"1"}"#;
    assert!(serde_json::from_str::<FilterState>(json).is_err());
  }

  #[test]
  fn test_store_round_trip() {
    let storage = storage();
    let mut store = FilterStore::load(storage.clone(), FilterState::default());
    store.set_date_range(DateRange::month_of(date(2024, 1, 1)));
    store.set_selected_branch(Branch::Named("Nairobi".to_string()));
    store.set_selected_product_line(ProductLine::Named("Dairy".to_string()));
    store.set_sales_target(SalesTarget::new(42));

    let reloaded = FilterStore::load(storage, FilterState::default());
    assert_eq!(reloaded.state(), store.state());
  }

  #[test]
  fn test_corrupt_state_falls_back_to_defaults() {
    let storage = storage();
    storage.set_item(FILTERS_KEY, "{not json").unwrap();

    let defaults = FilterState::with_target(777);
    let store = FilterStore::load(storage, defaults.clone());
    assert_eq!(store.state(), &defaults);
  }

  #[test]
  fn test_reset_persists_defaults() {
    let storage = storage();
    let defaults = FilterState::with_target(10);
    let mut store = FilterStore::load(storage.clone(), defaults.clone());
    store.set_selected_branch(Branch::Named("Kisumu".to_string()));
    store.reset_filters();

    let reloaded = FilterStore::load(storage, FilterState::default());
    assert_eq!(reloaded.state(), &defaults);
  }

  #[test]
  fn test_date_params() {
    let mut state = FilterState::default();
    assert_eq!(state.start_date_param(), None);

    state.date_range = DateRange::month_of(date(2024, 1, 9));
    assert_eq!(state.start_date_param().as_deref(), Some("2024-01-01"));
    assert_eq!(state.end_date_param().as_deref(), Some("2024-01-31"));
  }

  #[test]
  fn test_sales_target_parse() {
    assert_eq!(SalesTarget::parse("1,500,000").unwrap().value(), 1_500_000);
    assert!(SalesTarget::parse("lots").is_err());
  }
}
