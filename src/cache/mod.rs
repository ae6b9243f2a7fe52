//! Query caching for dashboard data.
//!
//! - [`QueryKey`]s are built from normalized filters, so equivalent requests
//!   share one entry
//! - [`QueryCache`] serves fresh entries without a network call and falls
//!   back to stale data when the backend is unreachable (offline mode)
//! - [`persist_query_cache`] keeps the cache across restarts
//! - [`CacheManager`] invalidates by entity and warms likely-next queries

mod key;
mod layer;
mod manager;
mod persist;
mod traits;

pub use key::{Entity, KpiFilters, NormalizedFilters, QueryDomain, QueryKey};
pub use layer::QueryCache;
pub use manager::CacheManager;
pub use persist::persist_query_cache;
pub use traits::{CacheResult, CacheSource, FetchPolicy};
