//! Cache-first reading gateway.
//!
//! Mediates between the remote document store and the local cache:
//! - Book reads are served from cache and revalidated in the background
//!   once older than the refresh threshold (stale-while-revalidate)
//! - Heading, content, bookmark and stats reads degrade to empty results
//! - Bookmark mutations write remote first, then patch the cached list
//! - Offline completeness is checked entry by entry across boxes

use futures::{future, stream, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::download::{DownloadEvent, DownloadHandle, Progress, PROGRESS_BUFFER};
use super::error::{DecodeError, GatewayError};
use super::refresh::{RefreshPolicy, RefreshRegistry};
use super::types::{Book, Bookmark, Heading, HeadingContent, NewBookmark, ReadingStats};
use super::{normalize, records};
use crate::cache::{refresh_threshold, CacheBox, CacheKey, CacheLayer, CacheStore};
use crate::connectivity::Connectivity;
use crate::remote::paths::{
  BOOKMARKS, BOOKS, BOOK_ID, CREATED_AT, HEADINGS, SEQUENCE, USER_STATS, VOLUMES,
};
use crate::remote::{Document, OrderBy, RemoteStore};

/// Tunables of the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
  /// Age after which a cached book is refreshed in the background
  pub refresh_threshold: chrono::Duration,
  /// Heading content fetches in flight during a download; 1 is sequential
  pub download_concurrency: usize,
  pub refresh: RefreshPolicy,
}

impl Default for GatewaySettings {
  fn default() -> Self {
    Self {
      refresh_threshold: refresh_threshold(),
      download_concurrency: 1,
      refresh: RefreshPolicy::default(),
    }
  }
}

/// Reading data gateway.
///
/// Cheap to clone; clones share the cache, the remote client and the
/// refresh registry.
#[derive(Clone)]
pub struct ReadingGateway {
  cache: CacheLayer,
  connectivity: Arc<dyn Connectivity>,
  remote: Arc<dyn RemoteStore>,
  refreshes: RefreshRegistry,
  settings: GatewaySettings,
}

impl ReadingGateway {
  pub fn new(
    cache: Arc<dyn CacheStore>,
    connectivity: Arc<dyn Connectivity>,
    remote: Arc<dyn RemoteStore>,
    settings: GatewaySettings,
  ) -> Self {
    Self {
      cache: CacheLayer::new(cache).with_stale_time(settings.refresh_threshold),
      connectivity,
      remote,
      refreshes: RefreshRegistry::new(),
      settings,
    }
  }

  // ==========================================================================
  // Books
  // ==========================================================================

  /// Get a book with its volumes.
  ///
  /// A cached copy is returned immediately. If it is older than the refresh
  /// threshold and we are online, a background refresh is scheduled; its
  /// outcome is never reported here.
  pub async fn get_book(&self, book_id: &str) -> Result<Book, GatewayError> {
    let key = CacheKey::book(book_id);

    if let Some(entry) = self.cache.read(&key).map_err(GatewayError::CacheUnavailable)? {
      match records::decode_book(&entry.value) {
        Ok(book) => {
          debug!(%key, age_secs = entry.age().num_seconds(), "book cache hit");
          if self.cache.is_stale(&entry) && self.connectivity.is_online().await {
            self.schedule_book_refresh(book_id);
          }
          return Ok(book);
        }
        Err(source) => {
          let failure = GatewayError::ParseFailure {
            key: key.to_string(),
            source,
          };
          warn!("{}", failure);
          self.cache.invalidate(&key);
        }
      }
    }

    debug!(%key, "book cache miss");
    self.fetch_and_cache_book(book_id).await
  }

  /// Re-fetch a book from the remote store and overwrite its cache entry.
  pub async fn refresh_book(&self, book_id: &str) -> Result<Book, GatewayError> {
    self.fetch_and_cache_book(book_id).await
  }

  async fn fetch_and_cache_book(&self, book_id: &str) -> Result<Book, GatewayError> {
    let document = self
      .remote
      .get_document(BOOKS, book_id)
      .await
      .map_err(GatewayError::RemoteUnavailable)?
      .ok_or_else(|| GatewayError::NotFound {
        entity: "book",
        id: book_id.to_string(),
      })?;

    let volumes = self
      .remote
      .list_subcollection(BOOKS, book_id, VOLUMES, OrderBy::asc(SEQUENCE))
      .await
      .map_err(GatewayError::RemoteUnavailable)?;

    let book = normalize::book(document, volumes);
    self.store(&CacheKey::book(book_id), records::encode_book(&book));
    Ok(book)
  }

  fn schedule_book_refresh(&self, book_id: &str) {
    let key = CacheKey::book(book_id).to_string();
    let gateway = self.clone();
    let book_id = book_id.to_string();

    let scheduled = self
      .refreshes
      .spawn(key.clone(), self.settings.refresh.clone(), move || {
        let gateway = gateway.clone();
        let book_id = book_id.clone();
        async move { gateway.fetch_and_cache_book(&book_id).await.map(|_| ()) }
      });

    if scheduled {
      info!(%key, "scheduled background refresh");
    }
  }

  /// Wait for all background refreshes to finish.
  pub async fn settle(&self) {
    self.refreshes.settle().await;
  }

  // ==========================================================================
  // Headings and content
  // ==========================================================================

  /// Ordered headings of a book; empty when they cannot be loaded.
  pub async fn get_headings(&self, book_id: &str) -> Vec<Heading> {
    self.load_headings(book_id).await.unwrap_or_else(|e| {
      warn!(book_id, error = %e, "serving empty heading list");
      Vec::new()
    })
  }

  async fn load_headings(&self, book_id: &str) -> Result<Vec<Heading>, GatewayError> {
    self
      .cache_first(
        &CacheKey::headings(book_id),
        records::decode_headings,
        records::encode_headings,
        || self.fetch_headings(book_id),
      )
      .await
  }

  async fn fetch_headings(&self, book_id: &str) -> Result<Vec<Heading>, GatewayError> {
    let documents = self
      .remote
      .list_subcollection(BOOKS, book_id, HEADINGS, OrderBy::asc(SEQUENCE))
      .await
      .map_err(GatewayError::RemoteUnavailable)?;

    Ok(
      documents
        .into_iter()
        .map(|doc| normalize::heading(doc, book_id))
        .collect(),
    )
  }

  /// A single heading by id.
  pub async fn get_heading(&self, heading_id: &str) -> Option<Heading> {
    let result = self
      .cache_first(
        &CacheKey::heading(heading_id),
        records::decode_heading,
        records::encode_heading,
        || async {
          let document = self.fetch_heading_document(heading_id).await;
          document.map(|doc| normalize::heading(doc, ""))
        },
      )
      .await;

    match result {
      Ok(heading) => Some(heading),
      Err(e) if e.is_not_found() => None,
      Err(e) => {
        warn!(heading_id, error = %e, "heading unavailable");
        None
      }
    }
  }

  /// Content of a heading; empty when it cannot be loaded.
  pub async fn get_heading_content(&self, heading_id: &str) -> HeadingContent {
    self
      .load_heading_content(heading_id)
      .await
      .unwrap_or_else(|e| {
        warn!(heading_id, error = %e, "serving empty heading content");
        HeadingContent::empty(heading_id)
      })
  }

  async fn load_heading_content(&self, heading_id: &str) -> Result<HeadingContent, GatewayError> {
    self
      .cache_first(
        &CacheKey::content(heading_id),
        records::decode_content,
        records::encode_content,
        || async {
          let document = self.fetch_heading_document(heading_id).await;
          document.map(normalize::heading_content)
        },
      )
      .await
  }

  async fn fetch_heading_document(&self, heading_id: &str) -> Result<Document, GatewayError> {
    self
      .remote
      .get_document(HEADINGS, heading_id)
      .await
      .map_err(GatewayError::RemoteUnavailable)?
      .ok_or_else(|| GatewayError::NotFound {
        entity: "heading",
        id: heading_id.to_string(),
      })
  }

  // ==========================================================================
  // Bookmarks
  // ==========================================================================

  /// Bookmarks of a book, newest first; empty when they cannot be loaded.
  pub async fn get_bookmarks(&self, book_id: &str) -> Vec<Bookmark> {
    let result = self
      .cache_first(
        &CacheKey::bookmarks(book_id),
        records::decode_bookmarks,
        records::encode_bookmarks,
        || self.fetch_bookmarks(book_id),
      )
      .await;

    result.unwrap_or_else(|e| {
      warn!(book_id, error = %e, "serving empty bookmark list");
      Vec::new()
    })
  }

  async fn fetch_bookmarks(&self, book_id: &str) -> Result<Vec<Bookmark>, GatewayError> {
    let documents = self
      .remote
      .query(
        BOOKMARKS,
        BOOK_ID,
        &Value::String(book_id.to_string()),
        OrderBy::desc(CREATED_AT),
      )
      .await
      .map_err(GatewayError::RemoteUnavailable)?;

    Ok(documents.into_iter().map(normalize::bookmark).collect())
  }

  /// Create a bookmark remotely, then prepend it to the cached list.
  ///
  /// Returns the finalized bookmark, or `None` if the remote write failed.
  pub async fn add_bookmark(&self, draft: NewBookmark) -> Option<Bookmark> {
    let fields = normalize::bookmark_fields(&draft);

    let id = match self.remote.add_document(BOOKMARKS, fields).await {
      Ok(id) => id,
      Err(e) => {
        warn!(book_id = %draft.book_id, error = %e, "failed to create bookmark");
        return None;
      }
    };

    let bookmark = draft.into_bookmark(id);
    let cached = bookmark.clone();
    self.patch_bookmarks(&bookmark.book_id, move |list| list.insert(0, cached));
    Some(bookmark)
  }

  /// Delete a bookmark remotely, then drop it from the cached list.
  ///
  /// Returns `true` iff the remote delete succeeded.
  pub async fn remove_bookmark(&self, bookmark_id: &str, book_id: &str) -> bool {
    if let Err(e) = self.remote.delete_document(BOOKMARKS, bookmark_id).await {
      warn!(bookmark_id, error = %e, "failed to delete bookmark");
      return false;
    }

    self.patch_bookmarks(book_id, |list| list.retain(|b| b.id != bookmark_id));
    true
  }

  /// Rewrite the cached bookmark list in place.
  ///
  /// A missing list is left missing. A list that fails to parse is removed
  /// so the next read repopulates it from the remote store.
  fn patch_bookmarks(&self, book_id: &str, patch: impl FnOnce(&mut Vec<Bookmark>)) {
    let key = CacheKey::bookmarks(book_id);

    let entry = match self.cache.read(&key) {
      Ok(Some(entry)) => entry,
      Ok(None) => {
        debug!(%key, "no cached bookmark list to patch");
        return;
      }
      Err(e) => {
        warn!(%key, error = %e, "failed to read bookmark list for patching");
        self.cache.invalidate(&key);
        return;
      }
    };

    let mut bookmarks = match records::decode_bookmarks_strict(&entry.value) {
      Ok(bookmarks) => bookmarks,
      Err(e) => {
        warn!(%key, error = %e, "invalidating unparseable bookmark list");
        self.cache.invalidate(&key);
        return;
      }
    };

    patch(&mut bookmarks);

    let written = records::encode_bookmarks(&bookmarks)
      .map_err(color_eyre::Report::from)
      .and_then(|value| self.cache.write(&key, &value));
    if let Err(e) = written {
      warn!(%key, error = %e, "failed to patch bookmark list");
      self.cache.invalidate(&key);
    }
  }

  // ==========================================================================
  // Reading stats
  // ==========================================================================

  /// Reading stats of a user; zeroed when they cannot be loaded.
  pub async fn get_reading_stats(&self, user_id: &str) -> ReadingStats {
    let result = self
      .cache_first(
        &CacheKey::stats(user_id),
        records::decode_stats,
        records::encode_stats,
        || self.fetch_stats(user_id),
      )
      .await;

    result.unwrap_or_else(|e| {
      if !e.is_not_found() {
        warn!(user_id, error = %e, "serving empty reading stats");
      }
      ReadingStats::empty(user_id)
    })
  }

  async fn fetch_stats(&self, user_id: &str) -> Result<ReadingStats, GatewayError> {
    let document = self
      .remote
      .get_document(USER_STATS, user_id)
      .await
      .map_err(GatewayError::RemoteUnavailable)?
      .ok_or_else(|| GatewayError::NotFound {
        entity: "reading stats",
        id: user_id.to_string(),
      })?;

    Ok(normalize::stats(document))
  }

  // ==========================================================================
  // Offline availability
  // ==========================================================================

  /// True iff the book, its heading list and the content of every listed
  /// heading are all cached.
  pub fn is_fully_cached(&self, book_id: &str) -> bool {
    let check = || -> color_eyre::Result<bool> {
      if !self.cache.contains(&CacheKey::book(book_id))? {
        return Ok(false);
      }

      let Some(entry) = self.cache.read(&CacheKey::headings(book_id))? else {
        return Ok(false);
      };
      let Ok(heading_ids) = records::heading_ids(&entry.value) else {
        return Ok(false);
      };

      for heading_id in &heading_ids {
        if !self.cache.contains(&CacheKey::content(heading_id))? {
          debug!(book_id, %heading_id, "heading content not cached");
          return Ok(false);
        }
      }
      Ok(true)
    };

    check().unwrap_or_else(|e| {
      warn!(book_id, error = %e, "offline check failed");
      false
    })
  }

  /// Ids of cached books that are fully available offline.
  pub fn offline_books(&self) -> Vec<String> {
    let keys = match self.cache.keys(CacheBox::Books) {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "failed to list cached books");
        return Vec::new();
      }
    };

    keys
      .iter()
      .filter_map(|key| CacheKey::parse_book_id(key))
      .filter(|book_id| self.is_fully_cached(book_id))
      .map(String::from)
      .collect()
  }

  /// Fetch everything a book needs offline and report whether it now is.
  ///
  /// Best effort: individual content failures are logged, not fatal.
  pub async fn download_for_offline(&self, book_id: &str) -> bool {
    self.run_download(book_id, &Progress::silent()).await
  }

  /// Start a download in the background and stream its progress.
  pub fn download_with_progress(&self, book_id: &str) -> DownloadHandle {
    let (sender, receiver) = mpsc::channel(PROGRESS_BUFFER);
    let cancelled = Arc::new(AtomicBool::new(false));

    let gateway = self.clone();
    let book_id = book_id.to_string();
    let flag = Arc::clone(&cancelled);
    tokio::spawn(async move {
      let progress = Progress::channel(&sender, &flag);
      gateway.run_download(&book_id, &progress).await;
    });

    DownloadHandle::new(receiver, cancelled)
  }

  async fn run_download(&self, book_id: &str, progress: &Progress<'_>) -> bool {
    if let Err(e) = self.get_book(book_id).await {
      warn!(book_id, error = %e, "book unavailable for download");
    }

    let headings = match self.load_headings(book_id).await {
      Ok(headings) => headings,
      Err(e) => {
        warn!(book_id, error = %e, "cannot list headings for download");
        progress
          .emit(DownloadEvent::Failed {
            book_id: book_id.to_string(),
            reason: e.to_string(),
          })
          .await;
        return self.is_fully_cached(book_id);
      }
    };

    let total = headings.len();
    info!(book_id, total, "downloading book for offline reading");
    progress
      .emit(DownloadEvent::Started {
        book_id: book_id.to_string(),
        total,
      })
      .await;

    let mut results = stream::iter(headings)
      .take_while(|_| future::ready(!progress.is_cancelled()))
      .map(|heading| async move {
        let result = self.load_heading_content(&heading.id).await;
        (heading.id, result)
      })
      .buffer_unordered(self.settings.download_concurrency.max(1));

    let mut done = 0;
    while let Some((heading_id, result)) = results.next().await {
      done += 1;
      let event = match result {
        Ok(_) => DownloadEvent::HeadingCached {
          heading_id,
          done,
          total,
        },
        Err(e) => {
          warn!(book_id, %heading_id, error = %e, "heading content download failed");
          DownloadEvent::HeadingFailed {
            heading_id,
            reason: e.to_string(),
          }
        }
      };
      progress.emit(event).await;
    }
    drop(results);

    let fully_cached = self.is_fully_cached(book_id);
    let terminal = if progress.is_cancelled() {
      info!(book_id, done, total, "download cancelled");
      DownloadEvent::Cancelled {
        book_id: book_id.to_string(),
      }
    } else {
      info!(book_id, fully_cached, "download finished");
      DownloadEvent::Completed {
        book_id: book_id.to_string(),
        fully_cached,
      }
    };
    progress.emit(terminal).await;

    fully_cached
  }

  // ==========================================================================
  // Shared read path
  // ==========================================================================

  /// Cache-first lookup for entities other than books.
  ///
  /// A hit that fails to decode is invalidated and treated as a miss. On a
  /// miss the fetched value is written back; a failed write is logged only.
  async fn cache_first<T, D, E, F, Fut>(
    &self,
    key: &CacheKey,
    decode: D,
    encode: E,
    fetch: F,
  ) -> Result<T, GatewayError>
  where
    D: Fn(&Value) -> Result<T, DecodeError>,
    E: Fn(&T) -> serde_json::Result<Value>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
  {
    if let Some(entry) = self.cache.read(key).map_err(GatewayError::CacheUnavailable)? {
      match decode(&entry.value) {
        Ok(value) => {
          debug!(%key, "cache hit");
          return Ok(value);
        }
        Err(source) => {
          let failure = GatewayError::ParseFailure {
            key: key.to_string(),
            source,
          };
          warn!("{}", failure);
          self.cache.invalidate(key);
        }
      }
    }

    debug!(%key, "cache miss");
    let value = fetch().await?;
    self.store(key, encode(&value));
    Ok(value)
  }

  fn store(&self, key: &CacheKey, encoded: serde_json::Result<Value>) {
    let written = encoded
      .map_err(color_eyre::Report::from)
      .and_then(|value| self.cache.write(key, &value));

    if let Err(e) = written {
      warn!(%key, error = %e, "failed to write cache entry");
    }
  }
}
