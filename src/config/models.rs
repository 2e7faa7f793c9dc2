use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::browser::BrowserFetcherConfig;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            fetch: FetchConfig::default(),
            progress: ProgressConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Where downloaded artifacts land
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root of the per-category model directory tree
    #[serde(default = "default_models_root")]
    pub models_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            models_root: default_models_root(),
        }
    }
}

/// Browser fetch tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Total budget for waiting on a download event, in seconds
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    /// Sleep step inside the bounded wait loop, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Interval between emitted progress events, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Parent directory for job-scoped browser downloads; system temp when
    /// unset
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            budget_secs: default_budget_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            user_agent: default_user_agent(),
            download_dir: None,
        }
    }
}

impl FetchConfig {
    pub fn fetcher_config(&self) -> BrowserFetcherConfig {
        BrowserFetcherConfig {
            budget: Duration::from_secs(self.budget_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            user_agent: self.user_agent.clone(),
            download_dir: self.download_dir.clone(),
        }
    }
}

/// Progress store tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressConfig {
    /// How long terminal records stay readable after a job finishes, in
    /// seconds. Zero restores delete-on-finish behavior.
    #[serde(default = "default_retain_terminal_secs")]
    pub retain_terminal_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retain_terminal_secs: default_retain_terminal_secs(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8188".parse().unwrap()
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024) // 64 KB; submissions are small JSON documents
}

fn default_models_root() -> PathBuf {
    PathBuf::from("models")
}

fn default_budget_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_progress_interval_ms() -> u64 {
    5000
}

fn default_user_agent() -> String {
    concat!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
        "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    )
    .to_string()
}

fn default_retain_terminal_secs() -> u64 {
    300
}
