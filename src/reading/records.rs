//! Versioned cache records for every entity class.
//!
//! Decoding fails closed: missing fields take defaults and unknown fields
//! are ignored. A record is rejected only when a field has the wrong JSON
//! type or it was written by a newer schema version.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::error::DecodeError;
use super::types::{Book, Bookmark, Heading, HeadingContent, ReadingStats, Volume};

/// Schema version written into every record
pub const RECORD_VERSION: u32 = 1;

fn current_version() -> u32 {
  RECORD_VERSION
}

trait Versioned {
  fn version(&self) -> u32;
}

/// A list element that either decoded or is kept aside as raw JSON.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Lenient<R> {
  Valid(R),
  Invalid(Value),
}

fn check_version<R: Versioned>(record: R) -> Result<R, DecodeError> {
  match record.version() {
    v if v > RECORD_VERSION => Err(DecodeError::UnsupportedVersion(v)),
    _ => Ok(record),
  }
}

fn decode<R: DeserializeOwned + Versioned>(value: &Value) -> Result<R, DecodeError> {
  check_version(R::deserialize(value)?)
}

/// Keep the records that decoded, dropping the rest.
fn keep_valid<R: Versioned, T>(items: Vec<Lenient<R>>, convert: impl Fn(R) -> T) -> Vec<T> {
  let total = items.len();
  let kept: Vec<T> = items
    .into_iter()
    .filter_map(|item| match item {
      Lenient::Valid(record) => check_version(record).ok(),
      Lenient::Invalid(_) => None,
    })
    .map(convert)
    .collect();

  if kept.len() < total {
    tracing::warn!(
      skipped = total - kept.len(),
      kept = kept.len(),
      "skipped malformed cached records"
    );
  }
  kept
}

fn decode_lenient_list<R, T>(value: &Value, convert: impl Fn(R) -> T) -> Result<Vec<T>, DecodeError>
where
  R: DeserializeOwned + Versioned,
{
  if !value.is_array() {
    return Err(DecodeError::NotAList);
  }
  let items: Vec<Lenient<R>> = Vec::deserialize(value)?;
  Ok(keep_valid(items, convert))
}

fn decode_strict_list<R, T>(value: &Value, convert: impl Fn(R) -> T) -> Result<Vec<T>, DecodeError>
where
  R: DeserializeOwned + Versioned,
{
  let items = value.as_array().ok_or(DecodeError::NotAList)?;
  items
    .iter()
    .map(|item| decode::<R>(item).map(&convert))
    .collect()
}

// ============================================================================
// Book and volumes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct VolumeRecord {
  #[serde(default = "current_version")]
  v: u32,
  #[serde(default)]
  id: String,
  #[serde(default)]
  sequence: i64,
  title: Option<String>,
  #[serde(default)]
  extra: Map<String, Value>,
}

impl Versioned for VolumeRecord {
  fn version(&self) -> u32 {
    self.v
  }
}

impl From<&Volume> for VolumeRecord {
  fn from(volume: &Volume) -> Self {
    Self {
      v: RECORD_VERSION,
      id: volume.id.clone(),
      sequence: volume.sequence,
      title: Some(volume.title.clone()),
      extra: volume.extra.clone(),
    }
  }
}

impl From<VolumeRecord> for Volume {
  fn from(record: VolumeRecord) -> Self {
    Volume {
      id: record.id,
      sequence: record.sequence,
      title: record.title.unwrap_or_default(),
      extra: record.extra,
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct BookRecord {
  #[serde(default = "current_version")]
  v: u32,
  #[serde(default)]
  id: String,
  title: Option<String>,
  author: Option<String>,
  description: Option<String>,
  cover_url: Option<String>,
  language: Option<String>,
  #[serde(default)]
  volumes: Vec<Lenient<VolumeRecord>>,
  #[serde(default)]
  extra: Map<String, Value>,
}

impl Versioned for BookRecord {
  fn version(&self) -> u32 {
    self.v
  }
}

pub fn encode_book(book: &Book) -> serde_json::Result<Value> {
  serde_json::to_value(BookRecord {
    v: RECORD_VERSION,
    id: book.id.clone(),
    title: Some(book.title.clone()),
    author: book.author.clone(),
    description: book.description.clone(),
    cover_url: book.cover_url.clone(),
    language: book.language.clone(),
    volumes: book
      .volumes
      .iter()
      .map(|v| Lenient::Valid(VolumeRecord::from(v)))
      .collect(),
    extra: book.extra.clone(),
  })
}

/// Rebuild a cached book. The result is marked as cache-sourced.
pub fn decode_book(value: &Value) -> Result<Book, DecodeError> {
  let record: BookRecord = decode(value)?;
  Ok(Book {
    id: record.id,
    title: record.title.unwrap_or_default(),
    author: record.author,
    description: record.description,
    cover_url: record.cover_url,
    language: record.language,
    volumes: keep_valid(record.volumes, Volume::from),
    extra: record.extra,
    is_from_cache: true,
  })
}

// ============================================================================
// Headings
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct HeadingRecord {
  #[serde(default = "current_version")]
  v: u32,
  #[serde(default)]
  id: String,
  #[serde(default)]
  book_id: String,
  #[serde(default)]
  sequence: i64,
  title: Option<String>,
  #[serde(default)]
  level: u32,
}

impl Versioned for HeadingRecord {
  fn version(&self) -> u32 {
    self.v
  }
}

impl From<&Heading> for HeadingRecord {
  fn from(heading: &Heading) -> Self {
    Self {
      v: RECORD_VERSION,
      id: heading.id.clone(),
      book_id: heading.book_id.clone(),
      sequence: heading.sequence,
      title: Some(heading.title.clone()),
      level: heading.level,
    }
  }
}

impl From<HeadingRecord> for Heading {
  fn from(record: HeadingRecord) -> Self {
    Heading {
      id: record.id,
      book_id: record.book_id,
      sequence: record.sequence,
      title: record.title.unwrap_or_default(),
      level: record.level,
    }
  }
}

pub fn encode_heading(heading: &Heading) -> serde_json::Result<Value> {
  serde_json::to_value(HeadingRecord::from(heading))
}

pub fn decode_heading(value: &Value) -> Result<Heading, DecodeError> {
  decode::<HeadingRecord>(value).map(Heading::from)
}

pub fn encode_headings(headings: &Vec<Heading>) -> serde_json::Result<Value> {
  serde_json::to_value(headings.iter().map(HeadingRecord::from).collect::<Vec<_>>())
}

/// Decode a heading list, skipping malformed records.
pub fn decode_headings(value: &Value) -> Result<Vec<Heading>, DecodeError> {
  decode_lenient_list::<HeadingRecord, _>(value, Heading::from)
}

/// Every heading id referenced by a cached heading list.
///
/// Only the ids are read, so a record with a bad field still counts. A
/// record without a string id fails the whole list.
pub fn heading_ids(value: &Value) -> Result<Vec<String>, DecodeError> {
  let items = value.as_array().ok_or(DecodeError::NotAList)?;
  items
    .iter()
    .map(|item| {
      item
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or(DecodeError::MissingId)
    })
    .collect()
}

// ============================================================================
// Heading content
// ============================================================================

/// SHA-256 of the canonical JSON form of a content body.
pub fn content_digest(body: &Map<String, Value>) -> String {
  let bytes = serde_json::to_vec(body).unwrap_or_default();
  hex::encode(Sha256::digest(&bytes))
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentRecord {
  #[serde(default = "current_version")]
  v: u32,
  #[serde(default)]
  heading_id: String,
  digest: Option<String>,
  #[serde(default)]
  body: Map<String, Value>,
}

impl Versioned for ContentRecord {
  fn version(&self) -> u32 {
    self.v
  }
}

pub fn encode_content(content: &HeadingContent) -> serde_json::Result<Value> {
  serde_json::to_value(ContentRecord {
    v: RECORD_VERSION,
    heading_id: content.heading_id.clone(),
    digest: Some(content_digest(&content.body)),
    body: content.body.clone(),
  })
}

/// Decode heading content, verifying its digest when one was stored.
pub fn decode_content(value: &Value) -> Result<HeadingContent, DecodeError> {
  let record: ContentRecord = decode(value)?;
  if let Some(digest) = &record.digest {
    if *digest != content_digest(&record.body) {
      return Err(DecodeError::DigestMismatch);
    }
  }
  Ok(HeadingContent {
    heading_id: record.heading_id,
    body: record.body,
  })
}

// ============================================================================
// Bookmarks
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct BookmarkRecord {
  #[serde(default = "current_version")]
  v: u32,
  #[serde(default)]
  id: String,
  #[serde(default)]
  book_id: String,
  #[serde(default)]
  created_at: DateTime<Utc>,
  position: Option<String>,
  note: Option<String>,
  #[serde(default)]
  extra: Map<String, Value>,
}

impl Versioned for BookmarkRecord {
  fn version(&self) -> u32 {
    self.v
  }
}

impl From<&Bookmark> for BookmarkRecord {
  fn from(bookmark: &Bookmark) -> Self {
    Self {
      v: RECORD_VERSION,
      id: bookmark.id.clone(),
      book_id: bookmark.book_id.clone(),
      created_at: bookmark.created_at,
      position: bookmark.position.clone(),
      note: bookmark.note.clone(),
      extra: bookmark.extra.clone(),
    }
  }
}

impl From<BookmarkRecord> for Bookmark {
  fn from(record: BookmarkRecord) -> Self {
    Bookmark {
      id: record.id,
      book_id: record.book_id,
      created_at: record.created_at,
      position: record.position,
      note: record.note,
      extra: record.extra,
    }
  }
}

pub fn encode_bookmarks(bookmarks: &Vec<Bookmark>) -> serde_json::Result<Value> {
  serde_json::to_value(bookmarks.iter().map(BookmarkRecord::from).collect::<Vec<_>>())
}

/// Decode a bookmark list for reading, skipping malformed records.
pub fn decode_bookmarks(value: &Value) -> Result<Vec<Bookmark>, DecodeError> {
  decode_lenient_list::<BookmarkRecord, _>(value, Bookmark::from)
}

/// Decode a bookmark list for patching; any malformed record fails the list.
pub fn decode_bookmarks_strict(value: &Value) -> Result<Vec<Bookmark>, DecodeError> {
  decode_strict_list::<BookmarkRecord, _>(value, Bookmark::from)
}

// ============================================================================
// Reading stats
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StatsRecord {
  #[serde(default = "current_version")]
  v: u32,
  #[serde(default)]
  user_id: String,
  #[serde(default)]
  books_read: u64,
  #[serde(default)]
  pages_read: u64,
  #[serde(default)]
  minutes_read: u64,
  #[serde(default)]
  streak_days: u32,
  last_read_at: Option<DateTime<Utc>>,
  #[serde(default)]
  extra: Map<String, Value>,
}

impl Versioned for StatsRecord {
  fn version(&self) -> u32 {
    self.v
  }
}

pub fn encode_stats(stats: &ReadingStats) -> serde_json::Result<Value> {
  serde_json::to_value(StatsRecord {
    v: RECORD_VERSION,
    user_id: stats.user_id.clone(),
    books_read: stats.books_read,
    pages_read: stats.pages_read,
    minutes_read: stats.minutes_read,
    streak_days: stats.streak_days,
    last_read_at: stats.last_read_at,
    extra: stats.extra.clone(),
  })
}

pub fn decode_stats(value: &Value) -> Result<ReadingStats, DecodeError> {
  let record: StatsRecord = decode(value)?;
  Ok(ReadingStats {
    user_id: record.user_id,
    books_read: record.books_read,
    pages_read: record.pages_read,
    minutes_read: record.minutes_read,
    streak_days: record.streak_days,
    last_read_at: record.last_read_at,
    extra: record.extra,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn heading(id: &str, sequence: i64) -> Heading {
    Heading {
      id: id.to_string(),
      book_id: "B1".to_string(),
      sequence,
      title: format!("Heading {id}"),
      level: 1,
    }
  }

  #[test]
  fn test_book_volumes_survive_cache() {
    let book = Book {
      id: "B1".into(),
      title: "Mukhtasar".into(),
      author: Some("Anon".into()),
      description: None,
      cover_url: None,
      language: Some("ar".into()),
      volumes: vec![Volume {
        id: "v1".into(),
        sequence: 1,
        title: "First".into(),
        extra: Map::new(),
      }],
      extra: Map::new(),
      is_from_cache: false,
    };

    let decoded = decode_book(&encode_book(&book).unwrap()).unwrap();
    assert!(decoded.is_from_cache);
    assert_eq!(decoded.volumes, book.volumes);
    assert_eq!(
      Book {
        is_from_cache: false,
        ..decoded
      },
      book
    );
  }

  #[test]
  fn test_missing_fields_take_defaults() {
    let decoded = decode_book(&json!({"id": "B1"})).unwrap();
    assert_eq!(decoded.title, "");
    assert!(decoded.volumes.is_empty());

    let h = decode_heading(&json!({"id": "h1", "unknown": [1, 2]})).unwrap();
    assert_eq!(h.sequence, 0);
    assert_eq!(h.level, 0);
  }

  #[test]
  fn test_newer_version_is_rejected() {
    let err = decode_book(&json!({"v": RECORD_VERSION + 1, "id": "B1"})).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedVersion(_)));
  }

  #[test]
  fn test_malformed_heading_record_skipped() {
    let mut value = encode_headings(&vec![heading("h1", 1), heading("h2", 2)]).unwrap();
    let list = value.as_array_mut().unwrap();
    list.insert(1, json!("garbage"));
    list.push(json!({"id": "h3", "sequence": "not a number"}));

    let headings = decode_headings(&value).unwrap();
    let ids: Vec<&str> = headings.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2"]);
  }

  #[test]
  fn test_heading_ids_include_malformed_records() {
    let value = json!([
      {"id": "h1", "sequence": 1},
      {"id": "h2", "level": "deep"}
    ]);
    assert_eq!(decode_headings(&value).unwrap().len(), 1);
    assert_eq!(heading_ids(&value).unwrap(), vec!["h1", "h2"]);

    assert!(matches!(
      heading_ids(&json!([{"id": "h1"}, "garbage"])),
      Err(DecodeError::MissingId)
    ));
  }

  #[test]
  fn test_heading_list_must_be_array() {
    assert!(matches!(
      decode_headings(&json!({"h1": {}})),
      Err(DecodeError::NotAList)
    ));
  }

  #[test]
  fn test_strict_bookmarks_reject_any_bad_record() {
    let value = json!([
      {"id": "a", "book_id": "B1", "created_at": "2024-01-02T03:04:05Z"},
      {"id": "b", "created_at": 12}
    ]);

    assert_eq!(decode_bookmarks(&value).unwrap().len(), 1);
    assert!(decode_bookmarks_strict(&value).is_err());
  }

  #[test]
  fn test_content_digest_detects_tampering() {
    let mut body = Map::new();
    body.insert("text".into(), json!("In the name of God"));
    let content = HeadingContent {
      heading_id: "h1".into(),
      body,
    };

    let mut value = encode_content(&content).unwrap();
    assert_eq!(decode_content(&value).unwrap(), content);

    value["body"]["text"] = json!("edited");
    assert!(matches!(
      decode_content(&value),
      Err(DecodeError::DigestMismatch)
    ));
  }

  #[test]
  fn test_stats_defaults() {
    let stats = decode_stats(&json!({"user_id": "u1", "pages_read": 10})).unwrap();
    assert_eq!(stats.pages_read, 10);
    assert_eq!(stats.streak_days, 0);
    assert!(stats.last_read_at.is_none());
  }
}
