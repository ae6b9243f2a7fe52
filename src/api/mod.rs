//! KPI backend access: REST sections, GraphQL pages and data ingestion.

mod client;
mod error;
pub mod graphql;
mod operations;
mod retry;
pub mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use operations::KpiOperation;
pub use retry::RetryPolicy;
pub use types::*;
