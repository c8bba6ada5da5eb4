//! Remote document store capability.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::{Map, Value};

/// A document as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
  pub id: String,
  pub fields: Map<String, Value>,
}

impl Document {
  pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
    Self {
      id: id.into(),
      fields,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Ascending,
  Descending,
}

impl Direction {
  pub fn as_str(self) -> &'static str {
    match self {
      Direction::Ascending => "asc",
      Direction::Descending => "desc",
    }
  }
}

/// Ordering applied by the remote store to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
  pub field: &'static str,
  pub direction: Direction,
}

impl OrderBy {
  pub fn asc(field: &'static str) -> Self {
    Self {
      field,
      direction: Direction::Ascending,
    }
  }

  pub fn desc(field: &'static str) -> Self {
    Self {
      field,
      direction: Direction::Descending,
    }
  }
}

/// Networked key-prefix document API.
///
/// Timeouts are the implementation's responsibility.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Fetch `{collection}/{id}`. `Ok(None)` when the document does not exist.
  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

  /// List `{collection}/{id}/{subcollection}` in the given order.
  async fn list_subcollection(
    &self,
    collection: &str,
    id: &str,
    subcollection: &str,
    order: OrderBy,
  ) -> Result<Vec<Document>>;

  /// List documents of `collection` whose `field` equals `equals`.
  async fn query(
    &self,
    collection: &str,
    field: &str,
    equals: &Value,
    order: OrderBy,
  ) -> Result<Vec<Document>>;

  /// Create a document with a store-assigned id and return that id.
  async fn add_document(&self, collection: &str, fields: Map<String, Value>) -> Result<String>;

  /// Delete `{collection}/{id}`. Deleting a missing document succeeds.
  async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;
}
