//! Namespaced cache keys for every entity class.

use chrono::Duration;

use super::traits::CacheBox;

const BOOK_PREFIX: &str = "book_";
const HEADINGS_SUFFIX: &str = "_headings";
const HEADING_PREFIX: &str = "heading_";
const CONTENT_PREFIX: &str = "content_";
const BOOKMARKS_PREFIX: &str = "bookmarks_";
const STATS_PREFIX: &str = "stats_";

/// A key addressed within a specific box.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub cache_box: CacheBox,
  pub key: String,
}

impl CacheKey {
  /// Book with its nested volumes.
  pub fn book(book_id: &str) -> Self {
    Self::new(CacheBox::Books, format!("{BOOK_PREFIX}{book_id}"))
  }

  /// Ordered heading list of a book. Lives in the books box.
  pub fn headings(book_id: &str) -> Self {
    Self::new(
      CacheBox::Books,
      format!("{BOOK_PREFIX}{book_id}{HEADINGS_SUFFIX}"),
    )
  }

  pub fn heading(heading_id: &str) -> Self {
    Self::new(CacheBox::Headings, format!("{HEADING_PREFIX}{heading_id}"))
  }

  pub fn content(heading_id: &str) -> Self {
    Self::new(CacheBox::Content, format!("{CONTENT_PREFIX}{heading_id}"))
  }

  /// Newest-first bookmark list of a book.
  pub fn bookmarks(book_id: &str) -> Self {
    Self::new(CacheBox::Bookmarks, format!("{BOOKMARKS_PREFIX}{book_id}"))
  }

  pub fn stats(user_id: &str) -> Self {
    Self::new(CacheBox::User, format!("{STATS_PREFIX}{user_id}"))
  }

  fn new(cache_box: CacheBox, key: String) -> Self {
    Self { cache_box, key }
  }

  pub fn ttl(&self) -> Duration {
    self.cache_box.ttl()
  }

  /// Recover the book id from a raw key of the books box.
  ///
  /// Heading-list keys share the box and are rejected.
  pub fn parse_book_id(raw: &str) -> Option<&str> {
    if raw.ends_with(HEADINGS_SUFFIX) {
      return None;
    }
    raw.strip_prefix(BOOK_PREFIX).filter(|id| !id.is_empty())
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.cache_box, self.key)
  }
}
