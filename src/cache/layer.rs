//! Cache layer that wraps a store with key-aware access and staleness checks.

use chrono::{Duration, Utc};
use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;

use super::keys::CacheKey;
use super::traits::{CacheBox, CacheEntry, CacheStore};

/// Default age after which a cached book is revalidated in the background.
pub fn refresh_threshold() -> Duration {
  Duration::hours(24)
}

/// Cache layer shared by the gateway and its background tasks.
///
/// Staleness is separate from TTL: a stale entry is still served, the TTL
/// only decides when the store drops it.
pub struct CacheLayer {
  store: Arc<dyn CacheStore>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl CacheLayer {
  /// Create a new cache layer over the given storage backend.
  pub fn new(store: Arc<dyn CacheStore>) -> Self {
    Self {
      store,
      stale_time: refresh_threshold(),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn is_stale(&self, entry: &CacheEntry) -> bool {
    Utc::now() - entry.written_at > self.stale_time
  }

  pub fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    self.store.get(key.cache_box, &key.key)
  }

  pub fn contains(&self, key: &CacheKey) -> Result<bool> {
    self.store.contains(key.cache_box, &key.key)
  }

  /// Write a payload under the key's box TTL.
  pub fn write(&self, key: &CacheKey, value: &Value) -> Result<()> {
    self.store.put(key.cache_box, &key.key, value, key.ttl())
  }

  /// Remove an entry, logging instead of failing.
  pub fn invalidate(&self, key: &CacheKey) {
    match self.store.remove(key.cache_box, &key.key) {
      Ok(()) => tracing::debug!(%key, "invalidated cache entry"),
      Err(e) => tracing::warn!(%key, error = %e, "failed to invalidate cache entry"),
    }
  }

  pub fn keys(&self, cache_box: CacheBox) -> Result<Vec<String>> {
    self.store.keys(cache_box)
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      stale_time: self.stale_time,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use serde_json::json;

  #[test]
  fn test_stale_after_threshold() {
    let store = Arc::new(MemoryStore::new());
    let layer = CacheLayer::new(store.clone());
    let key = CacheKey::book("B1");

    layer.write(&key, &json!({"id": "B1"})).unwrap();
    let fresh = layer.read(&key).unwrap().unwrap();
    assert!(!layer.is_stale(&fresh));

    store.backdate(key.cache_box, &key.key, Duration::hours(25));
    let stale = layer.read(&key).unwrap().unwrap();
    assert!(layer.is_stale(&stale));
  }

  #[test]
  fn test_custom_stale_time() {
    let layer = CacheLayer::new(Arc::new(MemoryStore::new())).with_stale_time(Duration::zero());
    let key = CacheKey::stats("u1");
    layer.write(&key, &json!({})).unwrap();

    let entry = layer.read(&key).unwrap().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(layer.is_stale(&entry));
  }

  #[test]
  fn test_invalidate_missing_key_is_quiet() {
    let layer = CacheLayer::new(Arc::new(MemoryStore::new()));
    layer.invalidate(&CacheKey::content("nope"));
    assert!(!layer.contains(&CacheKey::content("nope")).unwrap());
  }
}
