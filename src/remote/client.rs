use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::remote::api_types::{
  query_value, ApiCreateRequest, ApiCreated, ApiDocument, ApiDocumentList,
};
use crate::remote::traits::{Document, OrderBy, RemoteStore};

/// Per-request timeout for document API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for the remote document API
#[derive(Clone)]
pub struct HttpRemoteStore {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl HttpRemoteStore {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.remote.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.remote.url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Remote url {} cannot be used as a base", base));
    }

    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token: Config::get_api_token(),
    })
  }

  /// Build `{base}/{segments...}` with each segment percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Remote url {} cannot be used as a base", self.base))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self.client.request(method, url);
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  async fn list(&self, url: Url, what: &str) -> Result<Vec<Document>> {
    let response = self
      .request(Method::GET, url)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to list {}: {}", what, e))?;

    let list: ApiDocumentList = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} listing: {}", what, e))?;

    Ok(list.into())
  }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    let url = self.endpoint(&[collection, id])?;

    let response = self
      .request(Method::GET, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to get {}/{}: {}", collection, id, e))?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let document: ApiDocument = response
      .error_for_status()
      .map_err(|e| eyre!("Failed to get {}/{}: {}", collection, id, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {}/{}: {}", collection, id, e))?;

    Ok(Some(document.into()))
  }

  async fn list_subcollection(
    &self,
    collection: &str,
    id: &str,
    subcollection: &str,
    order: OrderBy,
  ) -> Result<Vec<Document>> {
    let mut url = self.endpoint(&[collection, id, subcollection])?;
    url
      .query_pairs_mut()
      .append_pair("order_by", order.field)
      .append_pair("direction", order.direction.as_str());

    self
      .list(url, &format!("{}/{}/{}", collection, id, subcollection))
      .await
  }

  async fn query(
    &self,
    collection: &str,
    field: &str,
    equals: &Value,
    order: OrderBy,
  ) -> Result<Vec<Document>> {
    let mut url = self.endpoint(&[collection])?;
    url
      .query_pairs_mut()
      .append_pair("field", field)
      .append_pair("equals", &query_value(equals))
      .append_pair("order_by", order.field)
      .append_pair("direction", order.direction.as_str());

    self.list(url, collection).await
  }

  async fn add_document(&self, collection: &str, fields: Map<String, Value>) -> Result<String> {
    let url = self.endpoint(&[collection])?;

    let created: ApiCreated = self
      .request(Method::POST, url)
      .json(&ApiCreateRequest { fields: &fields })
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to create document in {}: {}", collection, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse created document id: {}", e))?;

    Ok(created.id)
  }

  async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
    let url = self.endpoint(&[collection, id])?;

    let response = self
      .request(Method::DELETE, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete {}/{}: {}", collection, id, e))?;

    // Already gone counts as deleted
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(());
    }

    response
      .error_for_status()
      .map_err(|e| eyre!("Failed to delete {}/{}: {}", collection, id, e))?;

    Ok(())
  }
}
