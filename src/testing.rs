//! In-memory remote store for tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::remote::{Direction, Document, OrderBy, RemoteStore};

pub fn fields(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    other => panic!("expected a JSON object, got {other}"),
  }
}

#[derive(Debug, Default)]
pub struct CallCounts {
  pub get: AtomicUsize,
  pub list: AtomicUsize,
  pub query: AtomicUsize,
  pub add: AtomicUsize,
  pub delete: AtomicUsize,
}

impl CallCounts {
  pub fn get(&self) -> usize {
    self.get.load(Ordering::SeqCst)
  }

  pub fn list(&self) -> usize {
    self.list.load(Ordering::SeqCst)
  }

  pub fn query(&self) -> usize {
    self.query.load(Ordering::SeqCst)
  }

  pub fn total(&self) -> usize {
    let writes = self.add.load(Ordering::SeqCst) + self.delete.load(Ordering::SeqCst);
    self.get() + self.list() + self.query() + writes
  }
}

/// Remote store backed by hash maps.
///
/// Top-level documents live under `{collection}/{id}`, children under
/// `{collection}/{id}/{sub}`. While `failing` is set every call errors.
#[derive(Default)]
pub struct MockRemote {
  documents: Mutex<HashMap<String, Map<String, Value>>>,
  children: Mutex<HashMap<String, Vec<Document>>>,
  failing: AtomicBool,
  failing_gets: Mutex<Vec<String>>,
  next_id: AtomicU64,
  pub calls: CallCounts,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, collection: &str, id: &str, value: Value) {
    self
      .documents
      .lock()
      .unwrap()
      .insert(format!("{collection}/{id}"), fields(value));
  }

  pub fn insert_child(&self, collection: &str, id: &str, sub: &str, child_id: &str, value: Value) {
    self
      .children
      .lock()
      .unwrap()
      .entry(format!("{collection}/{id}/{sub}"))
      .or_default()
      .push(Document::new(child_id, fields(value)));
  }

  pub fn contains(&self, collection: &str, id: &str) -> bool {
    self
      .documents
      .lock()
      .unwrap()
      .contains_key(&format!("{collection}/{id}"))
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Make `get_document` fail for one `{collection}/{id}` only.
  pub fn fail_get(&self, collection: &str, id: &str) {
    self
      .failing_gets
      .lock()
      .unwrap()
      .push(format!("{collection}/{id}"));
  }

  fn check(&self) -> Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      Err(eyre!("remote unreachable"))
    } else {
      Ok(())
    }
  }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
  match (a, b) {
    (Some(Value::Number(a)), Some(Value::Number(b))) => a
      .as_f64()
      .partial_cmp(&b.as_f64())
      .unwrap_or(CmpOrdering::Equal),
    (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
    (Some(_), None) => CmpOrdering::Less,
    (None, Some(_)) => CmpOrdering::Greater,
    _ => CmpOrdering::Equal,
  }
}

fn sorted(mut documents: Vec<Document>, order: OrderBy) -> Vec<Document> {
  documents.sort_by(|a, b| {
    let ordering = compare(a.fields.get(order.field), b.fields.get(order.field));
    match order.direction {
      Direction::Ascending => ordering,
      Direction::Descending => ordering.reverse(),
    }
  });
  documents
}

#[async_trait]
impl RemoteStore for MockRemote {
  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    self.calls.get.fetch_add(1, Ordering::SeqCst);
    self.check()?;

    let path = format!("{collection}/{id}");
    if self.failing_gets.lock().unwrap().contains(&path) {
      return Err(eyre!("failed to fetch {path}"));
    }

    Ok(
      self
        .documents
        .lock()
        .unwrap()
        .get(&path)
        .map(|fields| Document::new(id, fields.clone())),
    )
  }

  async fn list_subcollection(
    &self,
    collection: &str,
    id: &str,
    subcollection: &str,
    order: OrderBy,
  ) -> Result<Vec<Document>> {
    self.calls.list.fetch_add(1, Ordering::SeqCst);
    self.check()?;

    let documents = self
      .children
      .lock()
      .unwrap()
      .get(&format!("{collection}/{id}/{subcollection}"))
      .cloned()
      .unwrap_or_default();
    Ok(sorted(documents, order))
  }

  async fn query(
    &self,
    collection: &str,
    field: &str,
    equals: &Value,
    order: OrderBy,
  ) -> Result<Vec<Document>> {
    self.calls.query.fetch_add(1, Ordering::SeqCst);
    self.check()?;

    let prefix = format!("{collection}/");
    let documents = self
      .documents
      .lock()
      .unwrap()
      .iter()
      .filter_map(|(path, fields)| {
        let id = path.strip_prefix(&prefix)?;
        (fields.get(field) == Some(equals)).then(|| Document::new(id, fields.clone()))
      })
      .collect();
    Ok(sorted(documents, order))
  }

  async fn add_document(&self, collection: &str, fields: Map<String, Value>) -> Result<String> {
    self.calls.add.fetch_add(1, Ordering::SeqCst);
    self.check()?;

    let id = format!("{}-{}", collection, self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    self
      .documents
      .lock()
      .unwrap()
      .insert(format!("{collection}/{id}"), fields);
    Ok(id)
  }

  async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
    self.calls.delete.fetch_add(1, Ordering::SeqCst);
    self.check()?;

    self
      .documents
      .lock()
      .unwrap()
      .remove(&format!("{collection}/{id}"));
    Ok(())
  }
}
