//! Response cache for API reads.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Stores query payloads keyed by a stable hash of the query identity
//! - Treats entries older than the stale time, or invalidated, as misses
//! - Invalidates every query of a (kind, id) scope at once after mutations
//! - Supports incremental fetching via `updated_at > last_fetched_updated_at`
//! - Runs at most one fetch per query at a time
//! - Optionally serves stale cache when the network is unavailable

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheScope, CacheSource, Cacheable, QueryKey};
