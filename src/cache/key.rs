//! Typed cache keys.
//!
//! Two requests that mean the same thing must land on the same cache entry.
//! Raw request parameters ([`KpiFilters`]) are therefore normalized before
//! they become part of a [`QueryKey`]:
//! - missing, blank and `"all"` branch / product line collapse to `All`
//! - item groups are trimmed, sorted and deduplicated
//! - the sales target is dropped for operations that ignore it

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::api::KpiOperation;
use crate::filters::{Branch, ProductLine};

/// Top-level grouping of cached queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryDomain {
  Dashboard,
  Branch,
  Product,
  Salesperson,
}

impl QueryDomain {
  pub fn as_str(&self) -> &'static str {
    match self {
      QueryDomain::Dashboard => "dashboard",
      QueryDomain::Branch => "branch",
      QueryDomain::Product => "product",
      QueryDomain::Salesperson => "salesperson",
    }
  }
}

/// Business entity whose changes invalidate cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
  Product,
  Salesperson,
  Branch,
}

impl FromStr for Entity {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "product" | "products" => Ok(Entity::Product),
      "salesperson" | "salespeople" => Ok(Entity::Salesperson),
      "branch" | "branches" => Ok(Entity::Branch),
      other => Err(format!("unknown entity '{}'", other)),
    }
  }
}

/// Request parameters as callers build them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KpiFilters {
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  pub branch: Option<String>,
  pub product_line: Option<String>,
  pub item_groups: Vec<String>,
  pub target: Option<u64>,
}

impl KpiFilters {
  /// Canonical form of these filters for `operation`.
  pub fn normalize(&self, operation: KpiOperation) -> NormalizedFilters {
    let mut item_groups: Vec<String> = self
      .item_groups
      .iter()
      .map(|g| g.trim().to_string())
      .filter(|g| !g.is_empty())
      .collect();
    item_groups.sort();
    item_groups.dedup();

    NormalizedFilters {
      start_date: self.start_date,
      end_date: self.end_date,
      branch: Branch::parse(self.branch.as_deref()),
      product_line: ProductLine::parse(self.product_line.as_deref()),
      item_groups,
      target: self.target.filter(|_| operation.uses_target()),
    }
  }
}

/// Filters after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedFilters {
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  pub branch: Branch,
  pub product_line: ProductLine,
  pub item_groups: Vec<String>,
  pub target: Option<u64>,
}

impl NormalizedFilters {
  /// Back to request parameters, e.g. to derive keys for other operations.
  pub fn to_kpi_filters(&self) -> KpiFilters {
    KpiFilters {
      start_date: self.start_date,
      end_date: self.end_date,
      branch: self.branch.name().map(String::from),
      product_line: self.product_line.name().map(String::from),
      item_groups: self.item_groups.clone(),
      target: self.target,
    }
  }
}

/// Cache key: `[domain, operation, normalized filters]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
  pub domain: QueryDomain,
  pub operation: KpiOperation,
  pub filters: NormalizedFilters,
}

impl QueryKey {
  pub fn new(operation: KpiOperation, filters: &KpiFilters) -> Self {
    Self {
      domain: operation.domain(),
      operation,
      filters: filters.normalize(operation),
    }
  }

  /// Whether a change to `entity` may affect this query's result.
  pub fn depends_on(&self, entity: Entity) -> bool {
    self.operation.related_entities().contains(&entity)
  }

  /// Stable, fixed-length identifier for this key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// JSON array of the key's parts; quoting keeps separators inside values
  /// from merging distinct keys.
  fn canonical(&self) -> String {
    let f = &self.filters;
    serde_json::json!([
      self.domain.as_str(),
      self.operation.name(),
      f.start_date.map(|d| d.to_string()),
      f.end_date.map(|d| d.to_string()),
      f.branch.name(),
      f.product_line.name(),
      f.item_groups,
      f.target,
    ])
    .to_string()
  }

  /// Human-readable description for logs.
  pub fn description(&self) -> String {
    let f = &self.filters;
    let range = match (f.start_date, f.end_date) {
      (None, None) => "all time".to_string(),
      (s, e) => format!(
        "{}..{}",
        s.map(|d| d.to_string()).unwrap_or_default(),
        e.map(|d| d.to_string()).unwrap_or_default()
      ),
    };
    format!(
      "{} [{}, {}, {}]",
      self.operation.name(),
      range,
      f.branch,
      f.product_line
    )
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.description())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn january() -> KpiFilters {
    KpiFilters {
      start_date: Some(date(2024, 1, 1)),
      end_date: Some(date(2024, 1, 31)),
      ..KpiFilters::default()
    }
  }

  #[test]
  fn test_missing_and_all_branch_share_a_key() {
    let a = KpiFilters {
      branch: None,
      ..january()
    };
    let b = KpiFilters {
      branch: Some("all".to_string()),
      product_line: Some("  ".to_string()),
      ..january()
    };

    let ka = QueryKey::new(KpiOperation::BranchPerformance, &a);
    let kb = QueryKey::new(KpiOperation::BranchPerformance, &b);
    assert_eq!(ka, kb);
    assert_eq!(ka.cache_hash(), kb.cache_hash());
  }

  #[test]
  fn test_item_group_order_and_duplicates_ignored() {
    let a = KpiFilters {
      item_groups: vec!["Snacks".into(), "Dairy".into(), "Dairy".into()],
      ..january()
    };
    let b = KpiFilters {
      item_groups: vec![" Dairy".into(), "Snacks".into(), "".into()],
      ..january()
    };

    let ka = QueryKey::new(KpiOperation::ProductAnalytics, &a);
    let kb = QueryKey::new(KpiOperation::ProductAnalytics, &b);
    assert_eq!(ka, kb);
    assert_eq!(ka.filters.item_groups, vec!["Dairy", "Snacks"]);
  }

  #[test]
  fn test_target_only_kept_where_used() {
    let a = KpiFilters {
      target: Some(100),
      ..january()
    };
    let b = KpiFilters {
      target: Some(200),
      ..january()
    };

    assert_eq!(
      QueryKey::new(KpiOperation::BranchPerformance, &a),
      QueryKey::new(KpiOperation::BranchPerformance, &b)
    );
    assert_ne!(
      QueryKey::new(KpiOperation::RevenueSummary, &a),
      QueryKey::new(KpiOperation::RevenueSummary, &b)
    );
  }

  #[test]
  fn test_named_branch_differs_from_all() {
    let nairobi = KpiFilters {
      branch: Some("Nairobi".to_string()),
      ..january()
    };

    let named = QueryKey::new(KpiOperation::BranchPerformance, &nairobi);
    let all = QueryKey::new(KpiOperation::BranchPerformance, &january());
    assert_ne!(named, all);
    assert_ne!(named.cache_hash(), all.cache_hash());
  }

  #[test]
  fn test_cache_hash_separates_lookalike_values() {
    let star = KpiFilters {
      branch: Some("*".to_string()),
      ..january()
    };
    assert_ne!(
      QueryKey::new(KpiOperation::BranchPerformance, &star).cache_hash(),
      QueryKey::new(KpiOperation::BranchPerformance, &january()).cache_hash()
    );

    let joined = KpiFilters {
      item_groups: vec!["a,b".to_string()],
      ..january()
    };
    let split = KpiFilters {
      item_groups: vec!["a".to_string(), "b".to_string()],
      ..january()
    };
    let joined = QueryKey::new(KpiOperation::ProductAnalytics, &joined);
    let split = QueryKey::new(KpiOperation::ProductAnalytics, &split);
    assert_ne!(joined, split);
    assert_ne!(joined.cache_hash(), split.cache_hash());
  }

  #[test]
  fn test_cache_hash_is_stable_hex() {
    let key = QueryKey::new(KpiOperation::DashboardData, &january());
    let hash = key.cache_hash();
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, key.clone().cache_hash());
  }

  #[test]
  fn test_depends_on() {
    let branch_key = QueryKey::new(KpiOperation::BranchPerformance, &january());
    let product_key = QueryKey::new(KpiOperation::ProductAnalytics, &january());
    let summary_key = QueryKey::new(KpiOperation::RevenueSummary, &january());

    assert!(branch_key.depends_on(Entity::Branch));
    assert!(!product_key.depends_on(Entity::Branch));
    assert!(summary_key.depends_on(Entity::Branch));
  }

  #[test]
  fn test_entity_from_str() {
    assert_eq!("Branch".parse::<Entity>(), Ok(Entity::Branch));
    assert_eq!("salespeople".parse::<Entity>(), Ok(Entity::Salesperson));
    assert!("warehouse".parse::<Entity>().is_err());
  }

  #[test]
  fn test_round_trip_through_kpi_filters() {
    let filters = KpiFilters {
      branch: Some("Mombasa".to_string()),
      target: Some(5),
      ..january()
    };
    let key = QueryKey::new(KpiOperation::DashboardData, &filters);
    let again = QueryKey::new(KpiOperation::DashboardData, &key.filters.to_kpi_filters());
    assert_eq!(key, again);
  }
}
