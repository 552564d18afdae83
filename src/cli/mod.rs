//! Command-line interface for reelmaker.
//!
//! Provides commands for compiling a video from ranked posts and for
//! inspecting the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adapters::{FfmpegEncoder, FfprobeProbe, RedditSource, YtdlFetcher};
use crate::config::{self, ConfigOverrides, ResolvedConfig};
use crate::core::{Capabilities, Orchestrator, PipelineError};
use crate::domain::{SelectionCriteria, SortMode, TimeWindow};

/// reelmaker - Compile ranked Reddit posts into a single video
#[derive(Parser, Debug)]
#[command(name = "reelmaker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a video from the posts of one or more subreddits
    Create(CreateArgs),

    /// Show resolved configuration
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Output video file
    pub output: PathBuf,

    /// Subreddit filter expression, e.g. "aww+gifs"
    #[arg(short, long)]
    pub filter: String,

    /// Sort mode
    #[arg(short, long, value_enum, default_value_t = SortMode::Hot)]
    pub sort: SortMode,

    /// Time window (only used by top and controversial)
    #[arg(short, long, value_enum, default_value_t = TimeWindow::Week)]
    pub time: TimeWindow,

    /// Maximum number of videos to include (1-100)
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Include posts marked nsfw
    #[arg(long)]
    pub nsfw: bool,

    /// Output size: 360p, 480p, 720p, 1080p, 1440p, 2160p, 4k or WxH
    #[arg(long)]
    pub size: Option<String>,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Keep cached files for this long, e.g. 3600, 12h, 30d, 2w, 6mo, 1y
    #[arg(long)]
    pub keep: Option<String>,

    /// Maximum parallel downloads
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl CreateArgs {
    /// Selection policy for the run
    pub fn criteria(&self) -> Result<SelectionCriteria, PipelineError> {
        SelectionCriteria::new(&self.filter, self.sort, self.time, self.limit, self.nsfw)
    }

    /// Flags that replace configured values
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cache_dir: self.cache_dir.clone(),
            cache_keep: self.keep.clone(),
            size: self.size.clone(),
            concurrency: self.concurrency,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Create(args) => create(args).await,
            Commands::Config => show_config(),
        }
    }
}

/// Default capabilities backed by Reddit, yt-dlp, ffprobe and ffmpeg
fn capabilities(cfg: &ResolvedConfig) -> Capabilities {
    Capabilities {
        source: Arc::new(RedditSource::new()),
        fetcher: Arc::new(YtdlFetcher::with_binary_path(&cfg.tools.fetcher)),
        probe: Arc::new(FfprobeProbe::with_binary_path(&cfg.tools.probe)),
        encoder: Arc::new(FfmpegEncoder::with_binary_path(&cfg.tools.encoder)),
    }
}

/// Compile a video
async fn create(args: CreateArgs) -> Result<()> {
    // Invalid input never reaches the pipeline
    let criteria = args.criteria()?;
    let cfg = config::load_config_with(&args.overrides())?;

    eprintln!(
        "Creating {} from r/{} ({}, {}, up to {} videos)...",
        args.output.display(),
        criteria.source_filter,
        criteria.sort,
        criteria.time,
        criteria.limit
    );

    let orchestrator = Orchestrator::new(capabilities(&cfg), cfg.pipeline_settings());
    let run = orchestrator
        .run(&criteria, &args.output)
        .await
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    eprintln!();
    eprintln!("[Run {} completed]", run.id);
    eprintln!(
        "   Videos:   {} ({} cached, {} downloaded)",
        run.stats.assets(),
        run.stats.cached,
        run.stats.fetched
    );
    if run.stats.fetch_failures > 0 {
        eprintln!("   Skipped:  {} failed downloads", run.stats.fetch_failures);
    }
    if run.stats.shortfall > 0 {
        eprintln!("   Shortfall: {} fewer than requested", run.stats.shortfall);
    }
    if let Some(duration) = run.duration_seconds() {
        eprintln!("   Duration: {}s", duration);
    }
    if let Some(ref output) = run.output {
        println!("{}", output.display());
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("reelmaker configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Cache:");
    println!("  Directory:   {}", cfg.cache_dir.display());
    println!("  Keep:        {}s", cfg.cache_keep.as_secs());
    println!();
    println!("Output:");
    println!("  Size:        {}", cfg.size);
    println!();
    println!("Downloads:");
    println!("  Concurrency: {}", cfg.concurrency);
    println!("  Attempts:    {}", cfg.retry.max_attempts);
    println!();
    println!("Timeouts:");
    println!("  Fetch:       {}s", cfg.fetch_timeout.as_secs());
    println!("  Probe:       {}s", cfg.probe_timeout.as_secs());
    println!("  Encode:      {}s", cfg.encode_timeout.as_secs());
    println!();
    println!("Tools:");
    println!("  Fetcher:     {}", cfg.tools.fetcher);
    println!("  Probe:       {}", cfg.tools.probe);
    println!("  Encoder:     {}", cfg.tools.encoder);

    Ok(())
}
