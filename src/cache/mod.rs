//! TTL-aware key/value cache partitioned into boxes.
//!
//! This module provides:
//! - The `CacheStore` capability (get-with-metadata, put-with-ttl, remove, list-keys)
//! - SQLite-backed and in-memory stores
//! - Namespaced keys per entity class and the staleness-aware `CacheLayer`

mod keys;
mod layer;
mod storage;
mod traits;

pub use keys::CacheKey;
pub use layer::{refresh_threshold, CacheLayer};
pub use storage::{MemoryStore, SqliteStore};
pub use traits::{CacheBox, CacheEntry, CacheStore};
