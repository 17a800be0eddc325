use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use picasso::application::{Blur, Grayscale};
use picasso::domain::entities::ImageId;
use picasso::infrastructure::config::{Command, FetchArgs, StatsArgs};
use picasso::infrastructure::{CliArgs, ConfigStorage, DiskImageCache, PicassoConfig};
use picasso::{LoadedImage, Picasso, PicassoBuilder, RequestCreator};

fn init_logging(config: &PicassoConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level.to_tracing_level()).into())
        .from_env_lossy();

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<PicassoConfig> {
    let storage = ConfigStorage::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn open_disk_cache(config: &PicassoConfig) -> Result<DiskImageCache> {
    let dir = config.effective_disk_cache_dir();
    DiskImageCache::new(dir.clone(), config.effective_disk_cache_size())
        .await
        .wrap_err_with(|| format!("Failed to open disk cache at {}", dir.display()))
}

fn describe(picasso: &Picasso, uri: &str, args: &FetchArgs) -> RequestCreator {
    let mut creator = picasso.load(uri);
    if let Some((width, height)) = args.resize {
        creator = creator.resize(i64::from(width), i64::from(height));
    }
    if args.center_crop {
        creator = creator.center_crop();
    }
    if args.center_inside {
        creator = creator.center_inside();
    }
    if args.only_scale_down {
        creator = creator.only_scale_down();
    }
    if let Some(degrees) = args.rotate {
        creator = creator.rotate(degrees);
    }
    if args.grayscale {
        creator = creator.transform(Arc::new(Grayscale));
    }
    if let Some(sigma) = args.blur {
        creator = creator.transform(Arc::new(Blur::new(sigma)));
    }
    if let Some(tag) = &args.tag {
        creator = creator.tag(tag.clone());
    }
    creator
}

async fn write_png(loaded: LoadedImage, out: &Path) -> Result<PathBuf> {
    let path = out.join(format!("{}.png", ImageId::from_url(&loaded.key)));
    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        loaded
            .image
            .save_with_format(&target, image::ImageFormat::Png)
    })
    .await?
    .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

async fn fetch(config: &PicassoConfig, args: FetchArgs) -> Result<()> {
    tokio::fs::create_dir_all(&args.out)
        .await
        .wrap_err_with(|| format!("Failed to create {}", args.out.display()))?;

    let picasso = PicassoBuilder::from_config(config).await?.build()?;

    let loads = args.uris.iter().map(|uri| {
        let creator = describe(&picasso, uri, &args);
        async move { (uri, creator.load().await) }
    });

    let mut failures = 0usize;
    for (uri, result) in join_all(loads).await {
        match result {
            Ok(loaded) => {
                let from = loaded.loaded_from;
                let path = write_png(loaded, &args.out).await?;
                println!("{uri} -> {} ({from})", path.display());
            }
            Err(e) => {
                warn!(uri = %uri, error = %e, "Load failed");
                eprintln!("{uri}: {e}");
                failures += 1;
            }
        }
    }

    if args.stats {
        print!("{}", picasso.snapshot().dump_to_string());
    }
    picasso.shutdown();

    if failures > 0 {
        return Err(eyre!("{failures} of {} loads failed", args.uris.len()));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct DiskReport {
    dir: PathBuf,
    size: u64,
    max_size: u64,
    entries: usize,
}

async fn stats(config: &PicassoConfig, args: &StatsArgs) -> Result<()> {
    let cache = open_disk_cache(config).await?;
    let report = DiskReport {
        dir: cache.dir().to_path_buf(),
        size: cache.current_size(),
        max_size: cache.max_size(),
        entries: cache.len(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Disk cache: {}", report.dir.display());
        println!("  Size: {} / {} bytes", report.size, report.max_size);
        println!("  Entries: {}", report.entries);
    }
    Ok(())
}

async fn clear(config: &PicassoConfig) -> Result<()> {
    let cache = open_disk_cache(config).await?;
    cache.clear().await?;
    println!("Cleared {}", cache.dir().display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = picasso::VERSION, "Starting {}", picasso::NAME);

    match args.command {
        Command::Fetch(fetch_args) => fetch(&config, fetch_args).await,
        Command::Stats(stats_args) => stats(&config, &stats_args).await,
        Command::Clear => clear(&config).await,
    }
}
