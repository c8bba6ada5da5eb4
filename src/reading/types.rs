use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A book with its ordered volumes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
  pub id: String,
  pub title: String,
  pub author: Option<String>,
  pub description: Option<String>,
  pub cover_url: Option<String>,
  pub language: Option<String>,
  pub volumes: Vec<Volume>,
  /// Document fields without a typed counterpart
  pub extra: Map<String, Value>,
  /// True only when rebuilt from the local cache
  pub is_from_cache: bool,
}

/// A volume; always owned by exactly one book
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Volume {
  pub id: String,
  pub sequence: i64,
  pub title: String,
  pub extra: Map<String, Value>,
}

/// Heading metadata (table-of-contents entry)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
  pub id: String,
  pub book_id: String,
  pub sequence: i64,
  pub title: String,
  pub level: u32,
}

/// Raw content payload of a heading, fetched lazily
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadingContent {
  pub heading_id: String,
  pub body: Map<String, Value>,
}

impl HeadingContent {
  pub fn empty(heading_id: &str) -> Self {
    Self {
      heading_id: heading_id.to_string(),
      body: Map::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.body.is_empty()
  }
}

/// A bookmark whose id was assigned by the remote store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bookmark {
  pub id: String,
  pub book_id: String,
  pub created_at: DateTime<Utc>,
  pub position: Option<String>,
  pub note: Option<String>,
  pub extra: Map<String, Value>,
}

/// A provisional bookmark that has not been written yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewBookmark {
  pub book_id: String,
  pub created_at: DateTime<Utc>,
  pub position: Option<String>,
  pub note: Option<String>,
  pub extra: Map<String, Value>,
}

impl NewBookmark {
  pub fn new(book_id: impl Into<String>) -> Self {
    Self {
      book_id: book_id.into(),
      created_at: Utc::now(),
      position: None,
      note: None,
      extra: Map::new(),
    }
  }

  pub fn with_position(mut self, position: impl Into<String>) -> Self {
    self.position = Some(position.into());
    self
  }

  pub fn with_note(mut self, note: impl Into<String>) -> Self {
    self.note = Some(note.into());
    self
  }

  /// Finalize with the id handed back by the write path.
  pub fn into_bookmark(self, id: String) -> Bookmark {
    Bookmark {
      id,
      book_id: self.book_id,
      created_at: self.created_at,
      position: self.position,
      note: self.note,
      extra: self.extra,
    }
  }
}

/// Per-user reading statistics
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReadingStats {
  pub user_id: String,
  pub books_read: u64,
  pub pages_read: u64,
  pub minutes_read: u64,
  pub streak_days: u32,
  pub last_read_at: Option<DateTime<Utc>>,
  pub extra: Map<String, Value>,
}

impl ReadingStats {
  pub fn empty(user_id: &str) -> Self {
    Self {
      user_id: user_id.to_string(),
      ..Self::default()
    }
  }
}
