//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query compilation settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Default strftime format for `:time` captures and casts
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

fn default_time_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Records per morsel; cancellation is checked between morsels
    #[serde(default = "default_partition_size")]
    pub partition_size: usize,

    /// Input size from which aggregation runs on the rayon pool
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Pre-filter phrase matches with the trigram index
    #[serde(default = "default_use_index")]
    pub use_index: bool,
}

fn default_partition_size() -> usize {
    4096
}

fn default_parallel_threshold() -> usize {
    10_000
}

fn default_use_index() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            partition_size: default_partition_size(),
            parallel_threshold: default_parallel_threshold(),
            use_index: default_use_index(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
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
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
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

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("logviewer").join("config.toml")),
            Some(PathBuf::from("/etc/logviewer/config.toml")),
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

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Query overrides
        if let Ok(format) = std::env::var("LOGVIEWER_TIME_FORMAT") {
            self.query.time_format = format;
        }

        // Execution overrides
        if let Ok(size) = std::env::var("LOGVIEWER_PARTITION_SIZE") {
            if let Ok(n) = size.parse() {
                self.execution.partition_size = n;
            }
        }
        if let Ok(threshold) = std::env::var("LOGVIEWER_PARALLEL_THRESHOLD") {
            if let Ok(n) = threshold.parse() {
                self.execution.parallel_threshold = n;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("LOGVIEWER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOGVIEWER_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Log Viewer Configuration
#
# Environment variables override these settings:
# - LOGVIEWER_TIME_FORMAT
# - LOGVIEWER_PARTITION_SIZE
# - LOGVIEWER_PARALLEL_THRESHOLD
# - LOGVIEWER_LOG_LEVEL
# - LOGVIEWER_LOG_FORMAT

[query]
# Default format for {name:time} captures and field:time casts
time_format = "%Y-%m-%d %H:%M:%S"

[execution]
# Records per partition; cancellation is checked between partitions
partition_size = 4096

# Aggregate on all cores once the input has this many records
parallel_threshold = 10000

# Pre-filter phrase searches with the trigram index
use_index = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/logviewer/logviewer.log"
"#
    .to_string()
}
