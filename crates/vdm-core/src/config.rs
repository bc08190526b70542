use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::Quality;
use crate::job::JobOptions;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per item (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/vdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdmConfig {
    /// Worker slots per job: how many items download at once.
    pub concurrency: usize,
    /// Stop claiming new items once one item exhausts its retries.
    /// Off by default: a partial channel is better than none.
    pub fail_fast: bool,
    /// Download quality: "best" (mp4-preferring video) or "audio".
    pub quality: Quality,
    /// Where downloads land; default is `~/Downloads/videos`.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Optional cap on items resolved per job.
    #[serde(default)]
    pub max_items: Option<usize>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for VdmConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            fail_fast: false,
            quality: Quality::Best,
            download_dir: None,
            max_items: None,
            retry: None,
        }
    }
}

impl VdmConfig {
    /// Per-job options derived from this config.
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            concurrency_limit: self.concurrency,
            fail_fast: self.fail_fast,
            retry: self.retry.clone().unwrap_or_default().policy(),
        }
    }

    /// Effective download root directory.
    pub fn download_root(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return dir.clone();
        }
        directories::UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("videos")
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = VdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: VdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
