//! Named GraphQL page queries.
//!
//! Fields are aliased to the snake_case names the REST endpoints use.

pub const DASHBOARD_DATA: &str = r#"
query DashboardData($startDate: String!, $endDate: String!, $branch: String, $productLine: String, $itemGroups: [String!], $target: Float) {
  revenue_summary: revenueSummary(startDate: $startDate, endDate: $endDate, branch: $branch, productLine: $productLine, itemGroups: $itemGroups, target: $target) {
    total_sales: totalSales
    gross_profit: grossProfit
    transactions
    average_sale: averageSale
    target_achievement_pct: targetAchievementPct
  }
  monthly_sales_growth: monthlySalesGrowth(startDate: $startDate, endDate: $endDate, branch: $branch, productLine: $productLine, itemGroups: $itemGroups) {
    month
    sales
    growth_pct: growthPct
  }
  branch_performance: branchPerformance(startDate: $startDate, endDate: $endDate, productLine: $productLine, itemGroups: $itemGroups) {
    branch
    total_sales: totalSales
    transactions
    average_sale: averageSale
    growth_pct: growthPct
  }
}
"#;

pub const PRODUCTS_PAGE_DATA: &str = r#"
query ProductsPageData($startDate: String!, $endDate: String!, $branch: String, $productLine: String, $itemGroups: [String!]) {
  product_analytics: productAnalytics(startDate: $startDate, endDate: $endDate, branch: $branch, productLine: $productLine, itemGroups: $itemGroups) {
    product
    product_line: productLine
    units_sold: unitsSold
    revenue
    margin_pct: marginPct
  }
}
"#;

pub const BRANCHES_PAGE_DATA: &str = r#"
query BranchesPageData($startDate: String!, $endDate: String!, $branch: String, $productLine: String, $itemGroups: [String!]) {
  branch_performance: branchPerformance(startDate: $startDate, endDate: $endDate, productLine: $productLine, itemGroups: $itemGroups) {
    branch
    total_sales: totalSales
    transactions
    average_sale: averageSale
    growth_pct: growthPct
  }
  branch_product_heatmap: branchProductHeatmap(startDate: $startDate, endDate: $endDate, branch: $branch, productLine: $productLine, itemGroups: $itemGroups) {
    branch
    product_line: productLine
    sales
  }
}
"#;

pub const SALESPEOPLE_PAGE_DATA: &str = r#"
query SalespeoplePageData($startDate: String!, $endDate: String!, $branch: String, $productLine: String, $itemGroups: [String!], $target: Float) {
  salesperson_performance: salespersonPerformance(startDate: $startDate, endDate: $endDate, branch: $branch, productLine: $productLine, itemGroups: $itemGroups, target: $target) {
    salesperson
    branch
    total_sales: totalSales
    deals
    target_achievement_pct: targetAchievementPct
  }
}
"#;

/// Operation name declared by a query document.
pub fn operation_name(document: &str) -> Option<&str> {
  let rest = document.trim_start().strip_prefix("query")?.trim_start();
  let end = rest.find(|c: char| !(c.is_alphanumeric() || c == '_'))?;
  Some(&rest[..end])
}
