//! Online/offline status oracle.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

use crate::config::Config;

/// Reports whether the remote store is currently reachable.
#[async_trait]
pub trait Connectivity: Send + Sync {
  async fn is_online(&self) -> bool;
}

/// Connectivity fixed by the caller, e.g. from an `--offline` flag.
#[derive(Debug)]
pub struct FixedConnectivity {
  online: AtomicBool,
}

impl FixedConnectivity {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

#[async_trait]
impl Connectivity for FixedConnectivity {
  async fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

/// Probes the remote base URL with a HEAD request.
///
/// Any HTTP response, whatever its status, means the network path works.
pub struct HttpProbe {
  client: reqwest::Client,
  url: Url,
}

impl HttpProbe {
  pub fn new(config: &Config) -> Result<Self> {
    let url = Url::parse(&config.remote.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.remote.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.remote.probe_timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, url })
  }
}

#[async_trait]
impl Connectivity for HttpProbe {
  async fn is_online(&self) -> bool {
    match self.client.head(self.url.clone()).send().await {
      Ok(_) => true,
      Err(e) => {
        tracing::debug!(url = %self.url, error = %e, "connectivity probe failed");
        false
      }
    }
  }
}
