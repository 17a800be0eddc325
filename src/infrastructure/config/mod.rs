//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{LogLevel, PicassoConfig};
pub use args::{CliArgs, Command, FetchArgs, StatsArgs};
pub use storage::{ConfigError, ConfigStorage};
