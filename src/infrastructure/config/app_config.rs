//! Loader configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::infrastructure::dispatch::{DEFAULT_BATCH_DELAY, DEFAULT_RETRY_DELAY, DEFAULT_THREAD_COUNT};
use crate::infrastructure::image::{
    DEFAULT_MEMORY_CACHE_SIZE, DEFAULT_TIMEOUT, MAX_DISK_CACHE_SIZE, bounded_disk_cache_size,
    default_cache_dir,
};

const APP_NAME: &str = "picasso";
const APP_QUALIFIER: &str = "org";
const APP_ORGANIZATION: &str = "picasso";

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Loader configuration, read from `config.toml` and overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicassoConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit request lifecycle events.
    #[serde(default)]
    pub logging_enabled: bool,

    /// Memory cache capacity in bytes.
    #[serde(default = "default_memory_cache_size")]
    pub memory_cache_size: u64,

    /// Disk cache directory. Uses the platform cache dir when unset.
    #[serde(default)]
    pub disk_cache_dir: Option<PathBuf>,

    /// Disk cache capacity in bytes.
    #[serde(default = "default_disk_cache_size")]
    pub disk_cache_size: u64,

    /// Initial number of workers.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay before retrying a failed load, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Delay used to coalesce deliveries, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Replay failed loads when connectivity returns.
    #[serde(default = "default_true")]
    pub scans_network_changes: bool,
}

fn default_memory_cache_size() -> u64 {
    DEFAULT_MEMORY_CACHE_SIZE
}

fn default_disk_cache_size() -> u64 {
    MAX_DISK_CACHE_SIZE
}

fn default_thread_count() -> usize {
    DEFAULT_THREAD_COUNT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[allow(clippy::cast_possible_truncation)]
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

#[allow(clippy::cast_possible_truncation)]
fn default_batch_delay_ms() -> u64 {
    DEFAULT_BATCH_DELAY.as_millis() as u64
}

fn default_true() -> bool {
    true
}

impl PicassoConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if args.verbose_events {
            self.logging_enabled = true;
        }
        if let Some(mib) = args.memory_cache_mb {
            self.memory_cache_size = mib.saturating_mul(BYTES_PER_MIB);
        }
        if let Some(dir) = &args.disk_cache_dir {
            self.disk_cache_dir = Some(dir.clone());
        }
        if let Some(threads) = args.threads {
            self.thread_count = threads;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("picasso.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }

    /// Returns the disk cache directory in use.
    #[must_use]
    pub fn effective_disk_cache_dir(&self) -> PathBuf {
        self.disk_cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Disk cache capacity after clamping.
    #[must_use]
    pub const fn effective_disk_cache_size(&self) -> u64 {
        bounded_disk_cache_size(self.disk_cache_size)
    }

    /// HTTP timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry delay.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Batch delay.
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for PicassoConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            logging_enabled: false,
            memory_cache_size: default_memory_cache_size(),
            disk_cache_dir: None,
            disk_cache_size: default_disk_cache_size(),
            thread_count: default_thread_count(),
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            scans_network_changes: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::MIN_DISK_CACHE_SIZE;
    use clap::Parser;
    use test_case::test_case;

    #[test_case(LogLevel::Trace, tracing::Level::TRACE ; "trace")]
    #[test_case(LogLevel::Info, tracing::Level::INFO ; "info")]
    #[test_case(LogLevel::Error, tracing::Level::ERROR ; "error")]
    fn test_log_level_maps_to_tracing(level: LogLevel, expected: tracing::Level) {
        assert_eq!(level.to_tracing_level(), expected);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
            logging_enabled = true
            memory_cache_size = 1048576
            thread_count = 6
            disk_cache_dir = "/tmp/picasso-cache"
        "#;

        let config: PicassoConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert!(config.logging_enabled);
        assert_eq!(config.memory_cache_size, 1_048_576);
        assert_eq!(config.thread_count, 6);
        assert_eq!(
            config.effective_disk_cache_dir(),
            PathBuf::from("/tmp/picasso-cache")
        );
        assert_eq!(config.retry_delay(), DEFAULT_RETRY_DELAY);
        assert!(config.scans_network_changes);
    }

    #[test]
    fn test_default_config() {
        let config = PicassoConfig::default();

        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.logging_enabled);
        assert_eq!(config.memory_cache_size, DEFAULT_MEMORY_CACHE_SIZE);
        assert_eq!(config.batch_delay(), DEFAULT_BATCH_DELAY);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.thread_count, DEFAULT_THREAD_COUNT);
    }

    #[test]
    fn test_disk_cache_size_is_clamped() {
        let config = PicassoConfig {
            disk_cache_size: 1,
            ..PicassoConfig::default()
        };
        assert_eq!(config.effective_disk_cache_size(), MIN_DISK_CACHE_SIZE);
    }

    #[test]
    fn test_merge_with_args() {
        let args = CliArgs::parse_from([
            "picasso",
            "--log-level",
            "debug",
            "--memory-cache-mb",
            "8",
            "--threads",
            "2",
            "--disk-cache-dir",
            "/tmp/elsewhere",
            "stats",
        ]);
        let mut config = PicassoConfig::default();
        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.memory_cache_size, 8 * 1024 * 1024);
        assert_eq!(config.thread_count, 2);
        assert_eq!(
            config.disk_cache_dir,
            Some(PathBuf::from("/tmp/elsewhere"))
        );
    }
}
