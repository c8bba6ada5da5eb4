//! Progress reporting for offline downloads.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the progress channel
pub const PROGRESS_BUFFER: usize = 64;

/// Progress of a book download.
///
/// Every download emits exactly one terminal event: `Completed`, `Failed`
/// or `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
  Started {
    book_id: String,
    total: usize,
  },
  HeadingCached {
    heading_id: String,
    done: usize,
    total: usize,
  },
  HeadingFailed {
    heading_id: String,
    reason: String,
  },
  /// `fully_cached` is the completeness check run after the batch
  Completed {
    book_id: String,
    fully_cached: bool,
  },
  Failed {
    book_id: String,
    reason: String,
  },
  Cancelled {
    book_id: String,
  },
}

impl DownloadEvent {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      DownloadEvent::Completed { .. }
        | DownloadEvent::Failed { .. }
        | DownloadEvent::Cancelled { .. }
    )
  }
}

/// Receiving end of a running download.
pub struct DownloadHandle {
  events: mpsc::Receiver<DownloadEvent>,
  cancelled: Arc<AtomicBool>,
}

impl DownloadHandle {
  pub(crate) fn new(events: mpsc::Receiver<DownloadEvent>, cancelled: Arc<AtomicBool>) -> Self {
    Self { events, cancelled }
  }

  /// Next progress event; `None` once the download task has finished.
  pub async fn next(&mut self) -> Option<DownloadEvent> {
    self.events.recv().await
  }

  /// Stop scheduling further headings. Content already fetched stays cached.
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  /// Drain events until the terminal one and return it.
  pub async fn wait(mut self) -> Option<DownloadEvent> {
    while let Some(event) = self.next().await {
      if event.is_terminal() {
        return Some(event);
      }
    }
    None
  }
}

/// Sending side held by the download task.
pub(crate) struct Progress<'a> {
  sender: Option<&'a mpsc::Sender<DownloadEvent>>,
  cancelled: Option<&'a AtomicBool>,
}

impl<'a> Progress<'a> {
  /// Progress that goes nowhere and is never cancelled.
  pub fn silent() -> Self {
    Self {
      sender: None,
      cancelled: None,
    }
  }

  pub fn channel(sender: &'a mpsc::Sender<DownloadEvent>, cancelled: &'a AtomicBool) -> Self {
    Self {
      sender: Some(sender),
      cancelled: Some(cancelled),
    }
  }

  pub async fn emit(&self, event: DownloadEvent) {
    if let Some(sender) = self.sender {
      // A dropped receiver only means nobody is watching
      let _ = sender.send(event).await;
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self
      .cancelled
      .is_some_and(|flag| flag.load(Ordering::SeqCst))
  }
}
