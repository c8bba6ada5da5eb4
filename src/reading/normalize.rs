//! Conversion of remote documents into entities.
//!
//! Remote documents are loosely typed. Known fields are lifted out with
//! lenient coercions (numbers given as strings, timestamps given as epoch
//! milliseconds); whatever is left stays in `extra`.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::types::{Book, Bookmark, Heading, HeadingContent, NewBookmark, ReadingStats, Volume};
use crate::remote::paths::{BOOK_ID, CREATED_AT, SEQUENCE};
use crate::remote::Document;

/// Heading fields that are metadata rather than content
const HEADING_METADATA: [&str; 4] = [BOOK_ID, SEQUENCE, "title", "level"];

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
  match fields.remove(key)? {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    Value::Null => None,
    // Wrong type: keep it around rather than lose it
    other => {
      fields.insert(key.to_string(), other);
      None
    }
  }
}

fn take_i64(fields: &mut Map<String, Value>, key: &str) -> Option<i64> {
  match fields.remove(key)? {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn take_u64(fields: &mut Map<String, Value>, key: &str) -> u64 {
  take_i64(fields, key)
    .and_then(|n| u64::try_from(n).ok())
    .unwrap_or_default()
}

fn take_datetime(fields: &mut Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
  match fields.remove(key)? {
    Value::String(s) => DateTime::parse_from_rfc3339(&s)
      .ok()
      .map(|dt| dt.with_timezone(&Utc)),
    Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
    _ => None,
  }
}

pub fn volume(doc: Document) -> Volume {
  let mut fields = doc.fields;
  Volume {
    id: doc.id,
    sequence: take_i64(&mut fields, SEQUENCE).unwrap_or_default(),
    title: take_string(&mut fields, "title").unwrap_or_default(),
    extra: fields,
  }
}

/// Build a book from its document and its (already ordered) volumes.
pub fn book(doc: Document, volumes: Vec<Document>) -> Book {
  let mut fields = doc.fields;
  Book {
    id: doc.id,
    title: take_string(&mut fields, "title").unwrap_or_default(),
    author: take_string(&mut fields, "author"),
    description: take_string(&mut fields, "description"),
    cover_url: take_string(&mut fields, "cover_url"),
    language: take_string(&mut fields, "language"),
    volumes: volumes.into_iter().map(volume).collect(),
    extra: fields,
    is_from_cache: false,
  }
}

/// Build a heading. `parent_book_id` applies when the document itself
/// carries no `book_id` (subcollection listings).
///
/// Every non-metadata field is content and is left to `heading_content`.
pub fn heading(doc: Document, parent_book_id: &str) -> Heading {
  let mut fields = doc.fields;
  Heading {
    id: doc.id,
    book_id: take_string(&mut fields, BOOK_ID).unwrap_or_else(|| parent_book_id.to_string()),
    sequence: take_i64(&mut fields, SEQUENCE).unwrap_or_default(),
    title: take_string(&mut fields, "title").unwrap_or_default(),
    level: take_i64(&mut fields, "level")
      .and_then(|n| u32::try_from(n).ok())
      .unwrap_or_default(),
  }
}

/// Extract the content fields of a heading document.
pub fn heading_content(doc: Document) -> HeadingContent {
  let body = doc
    .fields
    .into_iter()
    .filter(|(k, _)| !HEADING_METADATA.contains(&k.as_str()))
    .collect();

  HeadingContent {
    heading_id: doc.id,
    body,
  }
}

pub fn bookmark(doc: Document) -> Bookmark {
  let mut fields = doc.fields;
  Bookmark {
    id: doc.id,
    book_id: take_string(&mut fields, BOOK_ID).unwrap_or_default(),
    created_at: take_datetime(&mut fields, CREATED_AT).unwrap_or_default(),
    position: take_string(&mut fields, "position"),
    note: take_string(&mut fields, "note"),
    extra: fields,
  }
}

/// Fields written to the remote store for a new bookmark.
pub fn bookmark_fields(draft: &NewBookmark) -> Map<String, Value> {
  let mut fields = draft.extra.clone();
  fields.insert(BOOK_ID.into(), Value::String(draft.book_id.clone()));
  fields.insert(
    CREATED_AT.into(),
    Value::String(draft.created_at.to_rfc3339()),
  );
  if let Some(position) = &draft.position {
    fields.insert("position".into(), Value::String(position.clone()));
  }
  if let Some(note) = &draft.note {
    fields.insert("note".into(), Value::String(note.clone()));
  }
  fields
}

pub fn stats(doc: Document) -> ReadingStats {
  let mut fields = doc.fields;
  ReadingStats {
    user_id: doc.id,
    books_read: take_u64(&mut fields, "books_read"),
    pages_read: take_u64(&mut fields, "pages_read"),
    minutes_read: take_u64(&mut fields, "minutes_read"),
    streak_days: u32::try_from(take_u64(&mut fields, "streak_days")).unwrap_or(u32::MAX),
    last_read_at: take_datetime(&mut fields, "last_read_at"),
    extra: fields,
  }
}
