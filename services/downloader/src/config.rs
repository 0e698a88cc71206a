//! Configuration loading for derivative runs.
//!
//! The config file is YAML. A bare list of annotation URLs (for instance a
//! JSON array, which YAML also accepts) is read as a config with every other
//! setting at its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use iiif_common::{LevelRounding, DEFAULT_MAX_IMAGE_DIMENSION};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Root configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Source annotation URLs, one map each.
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Neither side of a derivative may exceed this.
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u64,
    /// Root of the persisted layout.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Base URL the output directory is served from.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_concurrent_maps")]
    pub max_concurrent_maps: usize,
    #[serde(default = "default_max_concurrent_tiles")]
    pub max_concurrent_tiles: usize,
    /// Remove records of maps no longer listed.
    #[serde(default = "default_enabled")]
    pub prune_stale: bool,
    #[serde(default)]
    pub level_rounding: LevelRounding,
    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_max_image_dimension() -> u64 {
    DEFAULT_MAX_IMAGE_DIMENSION
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_base_url() -> String {
    "http://localhost".to_string()
}

fn default_max_concurrent_maps() -> usize {
    2
}

fn default_max_concurrent_tiles() -> usize {
    8
}

fn default_enabled() -> bool {
    true
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("iiif-derivatives/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl TransferConfig {
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            annotations: Vec::new(),
            max_image_dimension: default_max_image_dimension(),
            output_dir: default_output_dir(),
            base_url: default_base_url(),
            max_concurrent_maps: default_max_concurrent_maps(),
            max_concurrent_tiles: default_max_concurrent_tiles(),
            prune_stale: default_enabled(),
            level_rounding: LevelRounding::default(),
            transfer: TransferConfig::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Urls(Vec<String>),
    Full(DownloaderConfig),
}

impl DownloaderConfig {
    /// Parse a config document.
    pub fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content).context("Failed to parse config")?;
        Ok(match file {
            ConfigFile::Urls(annotations) => DownloaderConfig {
                annotations,
                ..Default::default()
            },
            ConfigFile::Full(config) => config,
        })
    }

    /// Load a config from a YAML or JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(
            path = %path.display(),
            annotations = config.annotations.len(),
            "Loaded downloader config"
        );
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_image_dimension == 0 {
            bail!("max_image_dimension must be greater than 0");
        }
        if self.max_concurrent_maps == 0 {
            bail!("max_concurrent_maps must be greater than 0");
        }
        if self.max_concurrent_tiles == 0 {
            bail!("max_concurrent_tiles must be greater than 0");
        }
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if self.annotations.is_empty() {
            warn!("No annotation URLs configured, nothing to do");
        }
        Ok(())
    }
}
