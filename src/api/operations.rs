//! Catalogue of KPI operations exposed by the backend.

use serde::{Deserialize, Serialize};

use super::graphql;
use crate::cache::{Entity, QueryDomain};

/// A named backend query.
///
/// Section operations are served by REST endpoints under `/api/kpis`; page
/// operations are named GraphQL queries returning several sections at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KpiOperation {
  RevenueSummary,
  MonthlySalesGrowth,
  BranchPerformance,
  ProductAnalytics,
  SalespersonPerformance,
  BranchProductHeatmap,
  DashboardData,
  ProductsPageData,
  BranchesPageData,
  SalespeoplePageData,
}

/// How an operation reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
  Rest { path: &'static str },
  GraphQl { document: &'static str },
}

const ALL_ENTITIES: &[Entity] = &[Entity::Product, Entity::Salesperson, Entity::Branch];

impl KpiOperation {
  /// Stable identifier used in cache keys and logs.
  pub fn name(&self) -> &'static str {
    match self {
      Self::RevenueSummary => "revenueSummary",
      Self::MonthlySalesGrowth => "monthlySalesGrowth",
      Self::BranchPerformance => "branchPerformance",
      Self::ProductAnalytics => "productAnalytics",
      Self::SalespersonPerformance => "salespersonPerformance",
      Self::BranchProductHeatmap => "branchProductHeatmap",
      Self::DashboardData => "DashboardData",
      Self::ProductsPageData => "ProductsPageData",
      Self::BranchesPageData => "BranchesPageData",
      Self::SalespeoplePageData => "SalespeoplePageData",
    }
  }

  /// Field name of this section inside a page payload.
  pub fn section_field(&self) -> &'static str {
    match self {
      Self::RevenueSummary => "revenue_summary",
      Self::MonthlySalesGrowth => "monthly_sales_growth",
      Self::BranchPerformance => "branch_performance",
      Self::ProductAnalytics => "product_analytics",
      Self::SalespersonPerformance => "salesperson_performance",
      Self::BranchProductHeatmap => "branch_product_heatmap",
      Self::DashboardData => "dashboard",
      Self::ProductsPageData => "products",
      Self::BranchesPageData => "branches",
      Self::SalespeoplePageData => "salespeople",
    }
  }

  pub fn transport(&self) -> Transport {
    match self {
      Self::RevenueSummary => Transport::Rest {
        path: "/api/kpis/revenue-summary",
      },
      Self::MonthlySalesGrowth => Transport::Rest {
        path: "/api/kpis/monthly-sales-growth",
      },
      Self::BranchPerformance => Transport::Rest {
        path: "/api/kpis/branch-performance",
      },
      Self::ProductAnalytics => Transport::Rest {
        path: "/api/kpis/product-analytics",
      },
      Self::SalespersonPerformance => Transport::Rest {
        path: "/api/kpis/salesperson-performance",
      },
      Self::BranchProductHeatmap => Transport::Rest {
        path: "/api/kpis/branch-product-heatmap",
      },
      Self::DashboardData => Transport::GraphQl {
        document: graphql::DASHBOARD_DATA,
      },
      Self::ProductsPageData => Transport::GraphQl {
        document: graphql::PRODUCTS_PAGE_DATA,
      },
      Self::BranchesPageData => Transport::GraphQl {
        document: graphql::BRANCHES_PAGE_DATA,
      },
      Self::SalespeoplePageData => Transport::GraphQl {
        document: graphql::SALESPEOPLE_PAGE_DATA,
      },
    }
  }

  /// Key prefix used for grouping and invalidation.
  pub fn domain(&self) -> QueryDomain {
    match self {
      Self::RevenueSummary | Self::MonthlySalesGrowth | Self::DashboardData => {
        QueryDomain::Dashboard
      }
      Self::BranchPerformance | Self::BranchProductHeatmap | Self::BranchesPageData => {
        QueryDomain::Branch
      }
      Self::ProductAnalytics | Self::ProductsPageData => QueryDomain::Product,
      Self::SalespersonPerformance | Self::SalespeoplePageData => QueryDomain::Salesperson,
    }
  }

  /// Entities whose changes can alter this operation's result.
  ///
  /// Aggregates depend on everything.
  pub fn related_entities(&self) -> &'static [Entity] {
    match self {
      Self::RevenueSummary | Self::MonthlySalesGrowth | Self::DashboardData => ALL_ENTITIES,
      Self::BranchPerformance => &[Entity::Branch],
      Self::BranchProductHeatmap | Self::BranchesPageData => &[Entity::Branch, Entity::Product],
      Self::ProductAnalytics | Self::ProductsPageData => &[Entity::Product],
      Self::SalespersonPerformance | Self::SalespeoplePageData => &[Entity::Salesperson],
    }
  }

  /// Whether the sales target is passed to the backend.
  pub fn uses_target(&self) -> bool {
    matches!(
      self,
      Self::RevenueSummary
        | Self::SalespersonPerformance
        | Self::DashboardData
        | Self::SalespeoplePageData
    )
  }

  /// Page-level aggregates always send concrete date bounds.
  pub fn requires_dates(&self) -> bool {
    matches!(self.transport(), Transport::GraphQl { .. })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pages_use_graphql_and_sections_use_rest() {
    assert!(KpiOperation::DashboardData.requires_dates());
    assert!(!KpiOperation::BranchPerformance.requires_dates());
    assert!(matches!(
      KpiOperation::BranchPerformance.transport(),
      Transport::Rest {
        path: "/api/kpis/branch-performance"
      }
    ));
  }

  #[test]
  fn test_heatmap_depends_on_branches_and_products() {
    let entities = KpiOperation::BranchProductHeatmap.related_entities();
    assert!(entities.contains(&Entity::Branch));
    assert!(entities.contains(&Entity::Product));
    assert!(!entities.contains(&Entity::Salesperson));
  }
}
