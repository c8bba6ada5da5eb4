//! Serde types matching the document API's JSON bodies.
//!
//! These are separate from `Document` so the wire format can change
//! without touching the gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::traits::Document;

#[derive(Debug, Deserialize)]
pub struct ApiDocument {
  pub id: String,
  #[serde(default)]
  pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiDocumentList {
  #[serde(default)]
  pub documents: Vec<ApiDocument>,
}

#[derive(Debug, Serialize)]
pub struct ApiCreateRequest<'a> {
  pub fields: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCreated {
  pub id: String,
}

impl From<ApiDocument> for Document {
  fn from(doc: ApiDocument) -> Self {
    Document {
      id: doc.id,
      fields: doc.fields,
    }
  }
}

impl From<ApiDocumentList> for Vec<Document> {
  fn from(list: ApiDocumentList) -> Self {
    list.documents.into_iter().map(Document::from).collect()
  }
}

/// Render a filter value as a query-string parameter.
pub fn query_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
