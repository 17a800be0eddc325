//! Command-line interface of the `picasso` binary.

use super::app_config::LogLevel;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Global options followed by a subcommand.
#[derive(Debug, Parser)]
#[command(
    name = "picasso",
    version,
    about = "Fetch, transform and cache images",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log every request lifecycle event.
    #[arg(long, global = true)]
    pub verbose_events: bool,

    /// Memory cache capacity in MiB.
    #[arg(long, value_name = "MIB", global = true)]
    pub memory_cache_mb: Option<u64>,

    /// Disk cache directory.
    #[arg(long, value_name = "DIR", global = true)]
    pub disk_cache_dir: Option<PathBuf>,

    /// Number of concurrent workers.
    #[arg(long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of `picasso`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load images and write them as PNG files.
    Fetch(FetchArgs),
    /// Show disk cache usage.
    Stats(StatsArgs),
    /// Remove every file from the disk cache.
    Clear,
}

/// Options of `picasso fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// URIs to load (http, https, file or data).
    #[arg(required = true, value_name = "URI")]
    pub uris: Vec<String>,

    /// Output directory.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub out: PathBuf,

    /// Target size, e.g. 320x240. Either side may be 0 to keep the aspect ratio.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,

    /// Crop to fill the target size.
    #[arg(long, requires = "resize", conflicts_with = "center_inside")]
    pub center_crop: bool,

    /// Fit inside the target size.
    #[arg(long, requires = "resize")]
    pub center_inside: bool,

    /// Never upscale.
    #[arg(long, requires = "resize")]
    pub only_scale_down: bool,

    /// Rotation in degrees clockwise.
    #[arg(long, value_name = "DEG")]
    pub rotate: Option<f32>,

    /// Convert to grayscale.
    #[arg(long)]
    pub grayscale: bool,

    /// Gaussian blur radius.
    #[arg(long, value_name = "SIGMA")]
    pub blur: Option<f32>,

    /// Tag attached to every request.
    #[arg(long)]
    pub tag: Option<String>,

    /// Print loader statistics when done.
    #[arg(long)]
    pub stats: bool,
}

/// Options of `picasso stats`.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{value}'"))?;
    let width = width
        .trim()
        .parse()
        .map_err(|e| format!("invalid width '{width}': {e}"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|e| format!("invalid height '{height}': {e}"))?;
    Ok((width, height))
}
