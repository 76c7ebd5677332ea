use std::path::Path;

use serde::Deserialize;

/// Top-level config loaded from `shiftsync.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImportConfig {
    #[serde(default)]
    pub ods: OdsConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OdsConfig {
    #[serde(default = "default_max_ods_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_max_sheets")]
    pub max_sheets: usize,
    #[serde(default = "default_max_rows_per_sheet")]
    pub max_rows_per_sheet: usize,
    #[serde(default = "default_max_cols_per_row")]
    pub max_cols_per_row: usize,
}

impl Default for OdsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_ods_bytes(),
            max_sheets: default_max_sheets(),
            max_rows_per_sheet: default_max_rows_per_sheet(),
            max_cols_per_row: default_max_cols_per_row(),
        }
    }
}

fn default_max_ods_bytes() -> usize {
    100 * 1024 * 1024
}
fn default_max_sheets() -> usize {
    256
}
fn default_max_rows_per_sheet() -> usize {
    100_000
}
fn default_max_cols_per_row() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_timeout_total_secs")]
    pub timeout_total_secs: u64,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_total_secs: default_timeout_total_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_idle_per_host: default_max_idle_per_host(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_timeout_total_secs() -> u64 {
    30
}
fn default_dial_timeout_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    90
}
fn default_max_idle_per_host() -> usize {
    10
}
fn default_max_redirects() -> usize {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

fn default_max_workers() -> usize {
    5
}
fn default_max_queue_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "./shiftsync.db".to_string()
}

impl ImportConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist,
    /// A missing file falls back to defaults rather than erroring.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: ImportConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}
