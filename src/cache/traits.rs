//! Core traits and types for the cache store.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde_json::Value;

/// Named partition of the cache store.
///
/// Each entity class lives in its own box so keys never collide across
/// classes and each box carries its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheBox {
  /// Books (with nested volumes) and per-book heading lists
  Books,
  /// Individually addressable headings
  Headings,
  /// Heading content payloads
  Content,
  /// Per-book bookmark lists
  Bookmarks,
  /// Per-user auxiliary data (reading stats)
  User,
}

impl CacheBox {
  /// Storage name of the box.
  pub fn name(self) -> &'static str {
    match self {
      CacheBox::Books => "books",
      CacheBox::Headings => "headings",
      CacheBox::Content => "content",
      CacheBox::Bookmarks => "bookmarks",
      CacheBox::User => "user",
    }
  }

  /// Time-to-live applied to every entry written into this box.
  pub fn ttl(self) -> Duration {
    match self {
      CacheBox::Books | CacheBox::Headings | CacheBox::Content => Duration::days(7),
      CacheBox::Bookmarks => Duration::days(30),
      CacheBox::User => Duration::days(1),
    }
  }
}

impl std::fmt::Display for CacheBox {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// A cached value together with its write metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  /// The cached payload
  pub value: Value,
  /// When the entry was last written
  pub written_at: DateTime<Utc>,
  /// How long the store keeps the entry after `written_at`
  pub ttl: Duration,
}

impl CacheEntry {
  pub fn new(value: Value, ttl: Duration) -> Self {
    Self {
      value,
      written_at: Utc::now(),
      ttl,
    }
  }

  pub fn expires_at(&self) -> DateTime<Utc> {
    self.written_at + self.ttl
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at()
  }

  /// Time elapsed since the entry was written.
  pub fn age(&self) -> Duration {
    Utc::now() - self.written_at
  }
}

/// Trait for TTL-aware key/value cache backends.
///
/// Implementations enforce TTL themselves: an expired entry is never
/// returned by `get` or listed by `keys`.
pub trait CacheStore: Send + Sync {
  /// Get an entry with its metadata.
  fn get(&self, cache_box: CacheBox, key: &str) -> Result<Option<CacheEntry>>;

  /// Write an entry, resetting its write timestamp.
  fn put(&self, cache_box: CacheBox, key: &str, value: &Value, ttl: Duration) -> Result<()>;

  /// Remove an entry. Removing a missing key is not an error.
  fn remove(&self, cache_box: CacheBox, key: &str) -> Result<()>;

  /// List the live keys of a box.
  fn keys(&self, cache_box: CacheBox) -> Result<Vec<String>>;

  /// Check whether a live entry exists.
  fn contains(&self, cache_box: CacheBox, key: &str) -> Result<bool> {
    Ok(self.get(cache_box, key)?.is_some())
  }
}
