use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failures tolerated per chunk before the download fails.
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds (e.g. 0.5 = 500ms).
    pub retry_interval_secs: f64,
    /// Per-attempt connect timeout and per-read timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_interval_secs: 1.0,
            timeout_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            interval: Duration::from_secs_f64(self.retry_interval_secs.max(0.0)),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

/// Global configuration loaded from `~/.config/rdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdmConfig {
    /// Maximum number of chunks downloaded in parallel per file.
    pub max_sessions: usize,
    /// Size of each chunk in bytes (the last chunk may be shorter).
    pub chunk_size: u64,
    /// Optional bandwidth cap in bytes per second (None = unlimited).
    #[serde(default)]
    pub max_bytes_per_sec: Option<u64>,
    /// How often a running chunk persists its cursor to the sidecar (0 = after every read).
    #[serde(default = "default_flush_interval_ms")]
    pub metadata_flush_interval_ms: u64,
    /// TCP/TLS connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_flush_interval_ms() -> u64 {
    250
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("rdm/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RdmConfig {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            chunk_size: 4 << 20,
            max_bytes_per_sec: None,
            metadata_flush_interval_ms: default_flush_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            retry: None,
        }
    }
}

impl RdmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn metadata_flush_interval(&self) -> Duration {
        Duration::from_millis(self.metadata_flush_interval_ms)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<RdmConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: RdmConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
