//! Configuration of the history binaries
//!
//! ```text
//! defaults → config.toml → CHRONICLE_HISTORY_* environment variables
//! ```
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use crate::cleanup::MaxHistorySizeConfiguration;
use crate::storage::error::HistoryResult;
use crate::storage::{FileHistoryStorage, HistoryBucketRange, SamplingPeriod, SerializerKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage location, retention, maintenance timing and logging
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub downsampling: DownSamplingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// The sampling period raw samples arrive with
    #[serde(default = "default_natural_sampling_period")]
    pub natural_sampling_period: SamplingPeriod,

    #[serde(default)]
    pub serializer: SerializerKind,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("chronicle-history").to_string_lossy().to_string())
        .unwrap_or_else(|| "./chronicle_history_data".to_string())
}

fn default_natural_sampling_period() -> SamplingPeriod {
    SamplingPeriod::EveryHundredMillis
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            natural_sampling_period: default_natural_sampling_period(),
            serializer: SerializerKind::default(),
        }
    }
}

impl StorageConfig {
    /// Opens the file storage described by this section
    pub fn open(&self, retention: &RetentionConfig) -> HistoryResult<FileHistoryStorage> {
        let natural_range = self.natural_sampling_period.to_history_bucket_range();
        Ok(FileHistoryStorage::open(&self.data_dir, self.serializer.create())?
            .with_natural_sampling_period(self.natural_sampling_period)
            .with_max_size_configuration(retention.max_size_configuration(natural_range)))
    }
}

/// Retention configuration
///
/// `duration_ms` wins over `max_entries`, which wins over `kept_buckets`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_kept_buckets")]
    pub kept_buckets: usize,

    /// Guaranteed history length in the natural tier
    #[serde(default)]
    pub duration_ms: Option<f64>,

    /// Guaranteed number of samples in the natural tier
    #[serde(default)]
    pub max_entries: Option<usize>,
}

fn default_kept_buckets() -> usize {
    100
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            kept_buckets: default_kept_buckets(),
            duration_ms: None,
            max_entries: None,
        }
    }
}

impl RetentionConfig {
    pub fn max_size_configuration(&self, natural_range: HistoryBucketRange) -> MaxHistorySizeConfiguration {
        if let Some(duration) = self.duration_ms {
            return MaxHistorySizeConfiguration::for_duration(duration, natural_range);
        }
        if let Some(entries) = self.max_entries {
            return MaxHistorySizeConfiguration::for_max_entries(entries, natural_range);
        }
        MaxHistorySizeConfiguration::new(self.kept_buckets.max(1))
    }
}

/// Maintenance scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct DownSamplingConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,
}

fn default_interval() -> u64 {
    500
}

fn default_cleanup_interval() -> u64 {
    60_000 // 1 minute
}

impl Default for DownSamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            cleanup_interval_ms: default_cleanup_interval(),
        }
    }
}

impl DownSamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// The `EnvFilter` directive for this crate
    pub fn filter(&self) -> String {
        format!("chronicle_history={}", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Reads and parses `path` without looking at the environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// The defaults with the environment applied
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Reads `path`, then applies the environment
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// The first readable file of the user config dir, `/etc/chronicle-history`
    /// and the working directory, or the defaults
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("chronicle-history").join("config.toml")),
            Some(PathBuf::from("/etc/chronicle-history/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// The retention policy for the natural tier
    pub fn max_size_configuration(&self) -> MaxHistorySizeConfiguration {
        self.retention
            .max_size_configuration(self.storage.natural_sampling_period.to_history_bucket_range())
    }

        fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("CHRONICLE_HISTORY_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        if let Ok(kept) = std::env::var("CHRONICLE_HISTORY_KEPT_BUCKETS") {
            if let Ok(k) = kept.parse() {
                self.retention.kept_buckets = k;
            }
        }

        if let Ok(interval) = std::env::var("CHRONICLE_HISTORY_DOWNSAMPLING_INTERVAL_MS") {
            if let Ok(i) = interval.parse() {
                self.downsampling.interval_ms = i;
            }
        }

        if let Ok(level) = std::env::var("CHRONICLE_HISTORY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHRONICLE_HISTORY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// A commented `config.toml` with every default spelled out
pub fn generate_default_config() -> String {
    r#"# Chronicle History Configuration
#
# Environment variables override these settings:
# - CHRONICLE_HISTORY_DATA_DIR
# - CHRONICLE_HISTORY_KEPT_BUCKETS
# - CHRONICLE_HISTORY_DOWNSAMPLING_INTERVAL_MS
# - CHRONICLE_HISTORY_LOG_LEVEL
# - CHRONICLE_HISTORY_LOG_FORMAT

[storage]
# Directory for the bucket files
data_dir = "~/.local/share/chronicle-history"

# Sampling period of the raw samples
natural_sampling_period = "EveryHundredMillis"

# Bucket encoding: json or compressed
serializer = "compressed"

[retention]
# Buckets kept per tier
kept_buckets = 100

# Alternatively: guaranteed history length of the natural tier (ms)
# duration_ms = 3600000.0

# Alternatively: guaranteed number of samples of the natural tier
# max_entries = 36000

[downsampling]
# How often dirty ranges are down-sampled (ms)
interval_ms = 500

# How often old buckets are removed (ms)
cleanup_interval_ms = 60000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
