//! Derivative builder service.
//!
//! Builds local copies of the IIIF images behind georeferenced maps with:
//! - A global power-of-two downscale keeping every side within a limit
//! - Only the pyramid levels the derivative needs
//! - Automatic retry with exponential backoff
//! - Resumable runs: completed maps are skipped
//! - Georeference annotations rewritten against the derivative

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use downloader::{DownloaderConfig, Fetcher, HttpFetcher, Pipeline, RunStats, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Builds size-bounded IIIF derivatives for georeferenced maps")]
struct Args {
    /// Config file: YAML settings, or a JSON array of annotation URLs
    #[arg(short, long, env = "DOWNLOADER_CONFIG", default_value = "annotations.json")]
    config: PathBuf,

    /// Root directory for records, descriptors and tiles
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Maximum width or height of a derivative image
    #[arg(long)]
    max_dimension: Option<u64>,

    /// Base URL the output directory is served from
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Maximum maps processed concurrently
    #[arg(long)]
    max_concurrent_maps: Option<usize>,

    /// Maximum tile transfers per map
    #[arg(long)]
    max_concurrent_tiles: Option<usize>,

    /// Keep records of maps no longer listed
    #[arg(long)]
    no_prune: bool,

    /// Plan every map without transferring or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    fn apply(&self, config: &mut DownloaderConfig) {
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(max_dimension) = self.max_dimension {
            config.max_image_dimension = max_dimension;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(maps) = self.max_concurrent_maps {
            config.max_concurrent_maps = maps;
        }
        if let Some(tiles) = self.max_concurrent_tiles {
            config.max_concurrent_tiles = tiles;
        }
        if self.no_prune {
            config.prune_stale = false;
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if log_format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, &args.log_format)?;

    info!(started_at = %chrono::Utc::now().to_rfc3339(), "Starting derivative builder");

    // Without a source list there is nothing to do
    let mut config = DownloaderConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        maps = config.annotations.len(),
        max_image_dimension = config.max_image_dimension,
        output_dir = %config.output_dir.display(),
        level_rounding = ?config.level_rounding,
        dry_run = args.dry_run,
        "Loaded configuration"
    );

    let config = Arc::new(config);
    let stats = Arc::new(RunStats::new());
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpFetcher::new(config.transfer.clone(), stats.clone())
            .context("Failed to create transport")?,
    );
    let pipeline = Arc::new(
        Pipeline::new(config.clone(), fetcher, stats.clone()).with_dry_run(args.dry_run),
    );
    let scheduler = Scheduler::new(pipeline, config.max_concurrent_maps);

    tokio::select! {
        _ = scheduler.run(&config.annotations) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, stopping; incomplete maps will be redone next run");
        }
    }

    if config.prune_stale && !args.dry_run {
        let removed = scheduler.prune_stale(&config.annotations).await?;
        if !removed.is_empty() {
            info!(count = removed.len(), "Pruned stale records");
        }
    }

    let summary = stats.snapshot();
    info!(
        completed = summary.maps_completed,
        already_complete = summary.maps_already_complete,
        skipped = summary.maps_skipped,
        failed = summary.maps_failed,
        tiles = summary.tiles_downloaded,
        bytes = summary.tile_bytes,
        retries = summary.transfer_retries,
        "Run finished"
    );

    Ok(())
}
