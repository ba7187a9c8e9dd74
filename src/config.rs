//! Configuration loader and validator for the contact sync job.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default remote host for the contacts API.
pub const DEFAULT_BASE_URL: &str = "https://api.brevo.com/";

/// Environment variable that points at the data folder when running inside
/// a hosted job runner.
pub const DATA_DIR_ENV: &str = "KBC_DATADIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub brevo: Brevo,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub debug: bool,
}

/// Remote API credentials and endpoint.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Brevo {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Batching settings for the upsert endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_batch_size() -> usize {
    1
}

impl std::fmt::Debug for Brevo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brevo")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl App {
    /// Data folder to use, honouring the `KBC_DATADIR` override.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(&self.data_dir),
        }
    }
}

impl Brevo {
    pub fn url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::Invalid("brevo.base_url must be a valid URL"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.brevo.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("brevo.api_key must be non-empty"));
    }
    cfg.brevo.url()?;
    if cfg.sync.batch_size == 0 {
        return Err(ConfigError::Invalid("sync.batch_size must be > 0"));
    }
    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  debug: false

brevo:
  api_key: "YOUR_BREVO_API_KEY"
  base_url: "https://api.brevo.com/"

sync:
  batch_size: 1
"#
}
