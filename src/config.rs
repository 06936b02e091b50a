use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub lists: ListsConfig,
  pub cache: CacheConfig,
  pub telemetry: TelemetryConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  /// Directory for log files (defaults to the platform data directory)
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Server root; `/api/v1` is appended when missing
  pub base_url: String,
  /// Timeout for list and search queries
  pub list_timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_API_URL.to_string(),
      list_timeout_secs: 5,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListsConfig {
  pub page_size: usize,
  pub debounce_ms: u64,
}

impl Default for ListsConfig {
  fn default() -> Self {
    Self {
      page_size: 12,
      debounce_ms: 300,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  /// Entities kept per type; 0 keeps everything
  pub capacity: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      capacity: 500,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
  /// Collector URL; telemetry is off when unset
  pub endpoint: Option<String>,
  pub environment: Option<String>,
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rentdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rentdash/config.yaml
  ///
  /// A config file is optional; without one the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        debug!("no config file found, using defaults");
        Self::default()
      }
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rentdash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rentdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    debug!(path = %path.display(), "loaded config file");
    Ok(config)
  }

  /// Apply `RENTDASH_*` overrides read through `lookup`.
  ///
  /// - RENTDASH_API_URL: API base URL
  /// - RENTDASH_TELEMETRY_URL: telemetry collector
  /// - RENTDASH_ENV: environment tag attached to telemetry
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("RENTDASH_API_URL") {
      self.api.base_url = url;
    }
    if let Some(url) = get("RENTDASH_TELEMETRY_URL") {
      self.telemetry.endpoint = Some(url);
    }
    if let Some(env) = get("RENTDASH_ENV") {
      self.telemetry.environment = Some(env);
    }
  }

  /// Header title: configured title or the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    url::Url::parse(&self.api.base_url)
      .ok()
      .and_then(|u| u.host_str().map(str::to_string))
      .unwrap_or_else(|| "rentdash".to_string())
  }

  pub fn log_dir(&self) -> PathBuf {
    self.log_dir.clone().unwrap_or_else(|| {
      dirs::data_local_dir()
        .map(|d| d.join("rentdash").join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
    })
  }
}
