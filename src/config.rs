use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::reading::{GatewaySettings, RefreshPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  /// User whose reading stats `lectern stats` shows by default
  pub user_id: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the document API
  pub url: String,
  /// Reachability probe timeout, in seconds
  #[serde(default = "default_probe_timeout")]
  pub probe_timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
  3
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  /// SQLite file (defaults to $XDG_DATA_HOME/lectern/cache.db)
  pub path: Option<PathBuf>,
  pub refresh_threshold_hours: i64,
  pub download_concurrency: usize,
  /// Attempts per background refresh; 1 disables retry
  pub refresh_attempts: u32,
  pub refresh_backoff_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      refresh_threshold_hours: 24,
      download_concurrency: 1,
      refresh_attempts: 1,
      refresh_backoff_ms: 2000,
    }
  }
}

impl CacheConfig {
  pub fn gateway_settings(&self) -> GatewaySettings {
    GatewaySettings {
      refresh_threshold: chrono::Duration::hours(self.refresh_threshold_hours.max(0)),
      download_concurrency: self.download_concurrency.max(1),
      refresh: RefreshPolicy {
        max_attempts: self.refresh_attempts.max(1),
        backoff: std::time::Duration::from_millis(self.refresh_backoff_ms),
      },
    }
  }
}

impl Config {
  /// Load configuration from the first file that exists.
  ///
  /// An explicit path must exist. Otherwise `./lectern.yaml` is tried,
  /// then `lectern/config.yaml` under the platform config directory.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    if let Some(path) = explicit_path {
      if !path.is_file() {
        return Err(eyre!("Config file not found: {}", path.display()));
      }
      return Self::load_from_path(path);
    }

    let candidates = Self::candidate_paths();
    match candidates.iter().find(|path| path.is_file()) {
      Some(path) => Self::load_from_path(path),
      None => {
        let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        Err(eyre!(
          "No configuration file found (searched {}). See config.example.yaml for the format.",
          searched.join(", ")
        ))
      }
    }
  }

  /// Implicit config locations, in lookup order.
  fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("lectern.yaml")];
    paths.extend(dirs::config_dir().map(|dir| dir.join("lectern").join("config.yaml")));
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the API bearer token from `LECTERN_API_TOKEN`, if set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("LECTERN_API_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}
