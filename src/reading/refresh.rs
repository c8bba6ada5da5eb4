//! Background revalidation tasks.
//!
//! Each refresh is a detached tokio task identified by its cache key. The
//! registry keeps at most one unfinished task per key; later triggers for
//! the same key are dropped until it completes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::GatewayError;

/// Retry behaviour of a background refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
  /// Total attempts per trigger; 1 means no retry
  pub max_attempts: u32,
  /// Pause between attempts
  pub backoff: Duration,
}

impl Default for RefreshPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 1,
      backoff: Duration::from_secs(2),
    }
  }
}

struct InFlight {
  generation: u64,
  handle: JoinHandle<()>,
}

/// Registry of in-flight refresh tasks, keyed by cache key.
#[derive(Clone, Default)]
pub struct RefreshRegistry {
  in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
  generations: Arc<AtomicU64>,
}

impl RefreshRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Spawn `task` for `key` unless one is already running.
  ///
  /// Returns `false` when the trigger was dropped as a duplicate. Must be
  /// called from within a tokio runtime.
  pub fn spawn<F, Fut>(&self, key: String, policy: RefreshPolicy, mut task: F) -> bool
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
  {
    let mut in_flight = self.lock();

    if let Some(existing) = in_flight.get(&key) {
      if !existing.handle.is_finished() {
        debug!(%key, "refresh already in flight");
        return false;
      }
    }

    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
    let registry = self.clone();
    let task_key = key.clone();

    let handle = tokio::spawn(async move {
      run_with_policy(&task_key, &policy, &mut task).await;
      registry.finish(&task_key, generation);
    });

    in_flight.insert(key, InFlight { generation, handle });
    true
  }

  fn finish(&self, key: &str, generation: u64) {
    let mut in_flight = self.lock();
    if in_flight.get(key).map(|f| f.generation) == Some(generation) {
      in_flight.remove(key);
    }
  }

  pub fn is_in_flight(&self, key: &str) -> bool {
    self
      .lock()
      .get(key)
      .is_some_and(|f| !f.handle.is_finished())
  }

  /// Wait for every in-flight refresh, including ones spawned meanwhile.
  pub async fn settle(&self) {
    loop {
      let handles: Vec<(String, JoinHandle<()>)> = self
        .lock()
        .drain()
        .map(|(key, f)| (key, f.handle))
        .collect();

      if handles.is_empty() {
        return;
      }

      for (key, handle) in handles {
        if let Err(e) = handle.await {
          warn!(%key, error = %e, "refresh task aborted");
        }
      }
    }
  }
}

async fn run_with_policy<F, Fut>(key: &str, policy: &RefreshPolicy, task: &mut F)
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<(), GatewayError>>,
{
  let attempts = policy.max_attempts.max(1);

  for attempt in 1..=attempts {
    match task().await {
      Ok(()) => {
        info!(%key, attempt, "background refresh complete");
        return;
      }
      Err(e) => {
        let failure = GatewayError::BackgroundTaskFailure {
          key: key.to_string(),
          reason: e.to_string(),
        };
        warn!(attempt, attempts, "{}", failure);

        if attempt < attempts {
          tokio::time::sleep(policy.backoff).await;
        }
      }
    }
  }
}
