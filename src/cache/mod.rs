//! TTL-backed caching for upstream resources.
//!
//! This module is independent of the GitHub client:
//! - Stores one serialized payload per resource key with fetch/expiry times
//! - Serves fresh entries without touching the network
//! - Collapses concurrent misses for one key into a single fetch
//! - Serves expired entries when a refresh fails

mod inflight;
mod layer;
mod result;
mod storage;

pub use inflight::InFlight;
pub use layer::CacheLayer;
pub use result::{CacheResult, CacheSource};
pub use storage::{CacheEntry, CacheStore, SqliteStore};
