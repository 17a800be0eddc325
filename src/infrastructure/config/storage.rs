//! Reading and writing `config.toml`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::app_config::PicassoConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Failures while locating or persisting the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform has no per-user configuration directory.
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
    /// Filesystem access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be rendered as TOML.
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Owns the directory holding `config.toml`.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    config_dir: PathBuf,
}

impl ConfigStorage {
    /// Uses the per-user configuration directory for `picasso`.
    ///
    /// # Errors
    /// Returns `ConfigError::NoConfigDir` when the platform has none.
    pub fn new() -> Result<Self, ConfigError> {
        PicassoConfig::default_config_dir()
            .map(Self::with_dir)
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Uses `config_dir` instead of the platform directory.
    #[must_use]
    pub const fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Directory holding `config.toml`.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Creates the configuration directory if needed.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` when it cannot be created.
    pub fn ensure_config_dir(&self) -> Result<(), ConfigError> {
        if !self.config_dir.exists() {
            info!(dir = %self.config_dir.display(), "Creating configuration directory");
            fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Reads `path_override`, or `config.toml` in the configuration directory.
    ///
    /// A missing file is created with defaults. A file that does not parse is
    /// left untouched and defaults are used for this run.
    ///
    /// # Errors
    /// Returns `ConfigError` when the file cannot be read or the defaults cannot be written.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<PicassoConfig, ConfigError> {
        let path = path_override.map_or_else(|| self.config_dir.join(CONFIG_FILE_NAME), Path::to_path_buf);

        if !path.exists() {
            info!(path = %path.display(), "No config file, writing defaults");
            let config = PicassoConfig::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            write_atomically(&path, &config)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
            PicassoConfig::default()
        }))
    }

    /// Writes `config` to `config.toml` in the configuration directory.
    ///
    /// # Errors
    /// Returns `ConfigError` when the directory or file cannot be written.
    pub fn save_config(&self, config: &PicassoConfig) -> Result<(), ConfigError> {
        self.ensure_config_dir()?;
        write_atomically(&self.config_dir.join(CONFIG_FILE_NAME), config)
    }
}

/// Renders `config` next to `path` and renames it into place.
fn write_atomically(path: &Path, config: &PicassoConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("config path has no parent directory"))?;
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(content.as_bytes())?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_config_dir_creates_directory() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("picasso");
        let storage = ConfigStorage::with_dir(config_path.clone());

        assert!(!config_path.exists());
        storage.ensure_config_dir().unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_load_config_creates_default_if_missing() {
        let dir = tempdir().unwrap();
        let storage = ConfigStorage::with_dir(dir.path().to_path_buf());

        let config = storage.load_config(None).unwrap();
        assert!(config.scans_network_changes);

        let config_file = dir.path().join(CONFIG_FILE_NAME);
        assert!(config_file.exists());
    }

    #[test]
    fn test_load_config_handles_malformed_file() {
        let dir = tempdir().unwrap();
        let storage = ConfigStorage::with_dir(dir.path().to_path_buf());
        let config_file = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&config_file, "thread_count = [").unwrap();

        let config = storage.load_config(None).unwrap();
        assert_eq!(config.thread_count, PicassoConfig::default().thread_count);
        let content = fs::read_to_string(&config_file).unwrap();
        assert_eq!(content, "thread_count = [");
    }

    #[test]
    fn test_path_override() {
        let dir = tempdir().unwrap();
        let storage = ConfigStorage::with_dir(dir.path().join("unused"));
        let custom = dir.path().join("custom.toml");
        fs::write(&custom, "batch_delay_ms = 5\n").unwrap();

        let config = storage.load_config(Some(&custom)).unwrap();
        assert_eq!(config.batch_delay_ms, 5);
        assert!(!dir.path().join("unused").exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let storage = ConfigStorage::with_dir(dir.path().to_path_buf());

        let config = PicassoConfig {
            logging_enabled: true,
            thread_count: 7,
            ..PicassoConfig::default()
        };
        storage.save_config(&config).unwrap();

        let loaded = storage.load_config(None).unwrap();
        assert!(loaded.logging_enabled);
        assert_eq!(loaded.thread_count, 7);
    }
}
