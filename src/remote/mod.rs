//! Remote document store: capability trait, HTTP client and wire types.

pub mod api_types;
pub mod client;
pub mod traits;

pub use client::HttpRemoteStore;
pub use traits::{Direction, Document, OrderBy, RemoteStore};

/// Collection and field names of the document API.
pub mod paths {
  pub const BOOKS: &str = "books";
  pub const VOLUMES: &str = "volumes";
  pub const HEADINGS: &str = "headings";
  pub const BOOKMARKS: &str = "bookmarks";
  pub const USER_STATS: &str = "user_stats";

  pub const SEQUENCE: &str = "sequence";
  pub const BOOK_ID: &str = "book_id";
  pub const CREATED_AT: &str = "created_at";
}
