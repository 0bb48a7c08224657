use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  #[default]
  Development,
  Staging,
  Production,
}

impl Environment {
  pub fn api_url(&self) -> &'static str {
    match self {
      Environment::Development => "http://localhost:5000/api",
      Environment::Staging => "https://nextlevelmaintenance.com/mobile/api/staging",
      Environment::Production => "https://nextlevelmaintenance.com/mobile/api",
    }
  }

  pub fn log_level(&self) -> &'static str {
    match self {
      Environment::Development => "debug",
      Environment::Staging => "info",
      Environment::Production => "error",
    }
  }

  pub fn debug_mode(&self) -> bool {
    !matches!(self, Environment::Production)
  }

  fn parse(value: &str) -> Result<Self> {
    match value.trim().to_lowercase().as_str() {
      "development" | "dev" => Ok(Environment::Development),
      "staging" => Ok(Environment::Staging),
      "production" | "prod" => Ok(Environment::Production),
      other => Err(eyre!("Unknown environment: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub environment: Environment,
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Overrides the environment's default URL
  pub url: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_probe_timeout_secs")]
  pub probe_timeout_secs: u64,
  #[serde(default = "default_sync_interval_secs")]
  pub sync_interval_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_timeout_secs: default_probe_timeout_secs(),
      sync_interval_secs: default_sync_interval_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Database file (default: $XDG_DATA_HOME/fieldq/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Overrides the environment's default level
  pub level: Option<String>,
  /// Log file (default: $XDG_DATA_HOME/fieldq/logs/fieldq.log, rotated daily)
  pub file: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_probe_timeout_secs() -> u64 {
  5
}

fn default_sync_interval_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fieldq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fieldq/config.yaml
  ///
  /// Without a file the built-in defaults apply. `FIELDQ_ENV` and
  /// `FIELDQ_API_URL` override the file either way.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    config.with_env_overrides(
      std::env::var("FIELDQ_ENV").ok().as_deref(),
      std::env::var("FIELDQ_API_URL").ok().as_deref(),
    )
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fieldq.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fieldq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn with_env_overrides(mut self, env: Option<&str>, api_url: Option<&str>) -> Result<Self> {
    if let Some(env) = env.filter(|e| !e.is_empty()) {
      self.environment = Environment::parse(env)?;
    }
    if let Some(url) = api_url.filter(|u| !u.is_empty()) {
      self.api.url = Some(url.to_string());
    }
    Ok(self)
  }

  pub fn api_url(&self) -> &str {
    self
      .api
      .url
      .as_deref()
      .unwrap_or_else(|| self.environment.api_url())
  }

  pub fn log_level(&self) -> &str {
    self
      .log
      .level
      .as_deref()
      .unwrap_or_else(|| self.environment.log_level())
  }

  pub fn debug_mode(&self) -> bool {
    self.environment.debug_mode()
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_secs(self.network.probe_timeout_secs)
  }

  pub fn sync_interval(&self) -> Duration {
    Duration::from_secs(self.network.sync_interval_secs.max(1))
  }
}
