//! Configuration for reelmaker.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (`ConfigOverrides`)
//! 2. Environment variables (REELMAKER_CACHE_DIR, REELMAKER_CACHE_KEEP)
//! 3. Config file (.reelmaker/config.yaml)
//! 4. Defaults (platform cache dir, 30 day retention, 720p)
//!
//! Config file discovery:
//! - Searches current directory and parents for .reelmaker/config.yaml
//! - Paths in config file are relative to the project root (the parent
//!   of .reelmaker/)

pub mod duration;
pub mod size;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{DownloadSettings, PipelineError, PipelineSettings, RetryPolicy};
use crate::domain::OutputSize;

pub use duration::parse_duration;
pub use size::parse_output_size;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const ENV_CACHE_DIR: &str = "REELMAKER_CACHE_DIR";
pub const ENV_CACHE_KEEP: &str = "REELMAKER_CACHE_KEEP";

const DEFAULT_KEEP: &str = "30d";
const DEFAULT_SIZE: &str = "720p";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Cache directory (relative to project root)
    pub dir: Option<String>,
    /// Retention, e.g. `30d`
    pub keep: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Preset or `WxH`
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadConfig {
    pub concurrency: Option<usize>,
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsConfig {
    pub fetch_seconds: Option<u64>,
    pub probe_seconds: Option<u64>,
    pub encode_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub fetcher: Option<String>,
    pub probe: Option<String>,
    pub encoder: Option<String>,
}

/// Command-line values; each one replaces every lower source, which is
/// then never read
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cache_dir: Option<PathBuf>,
    pub cache_keep: Option<String>,
    pub size: Option<String>,
    pub concurrency: Option<usize>,
}

/// External tool binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub fetcher: String,
    pub probe: String,
    pub encoder: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            fetcher: "yt-dlp".to_string(),
            probe: "ffprobe".to_string(),
            encoder: "ffmpeg".to_string(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub cache_dir: PathBuf,
    pub cache_keep: Duration,
    pub size: OutputSize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    pub encode_timeout: Duration,
    pub tools: ToolPaths,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Pipeline settings before command-line overrides
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            cache_dir: self.cache_dir.clone(),
            cache_keep: self.cache_keep,
            size: self.size,
            download: DownloadSettings {
                concurrency: self.concurrency,
                fetch_timeout: self.fetch_timeout,
                retry: self.retry.clone(),
            },
            probe_timeout: self.probe_timeout,
            encode_timeout: self.encode_timeout,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".reelmaker").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Default cache directory (~/.cache/reelmaker on Linux)
fn default_cache_dir() -> Result<PathBuf> {
    Ok(dirs::cache_dir()
        .context("Failed to determine cache directory")?
        .join("reelmaker"))
}

/// Merge overrides, environment, config file and defaults.
///
/// `env` looks up an environment variable; taking it as a parameter keeps
/// resolution testable without touching the process environment.
fn resolve_config(
    config_path: Option<PathBuf>,
    file: ConfigFile,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    // Project root is the parent of .reelmaker/
    let base_dir = config_path
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    let cache_dir = if let Some(ref dir) = overrides.cache_dir {
        dir.clone()
    } else if let Some(env_dir) = env(ENV_CACHE_DIR) {
        PathBuf::from(env_dir)
    } else if let Some(ref dir) = file.cache.dir {
        resolve_path(base_dir, dir)
    } else {
        default_cache_dir()?
    };

    let keep = overrides
        .cache_keep
        .clone()
        .or_else(|| env(ENV_CACHE_KEEP))
        .or(file.cache.keep)
        .unwrap_or_else(|| DEFAULT_KEEP.to_string());
    let cache_keep =
        parse_duration(&keep).with_context(|| format!("Invalid cache retention '{}'", keep))?;

    let size = overrides
        .size
        .clone()
        .or(file.output.size)
        .unwrap_or_else(|| DEFAULT_SIZE.to_string());
    let size = parse_output_size(&size)?;

    let defaults = DownloadSettings::default();
    let tools = ToolPaths::default();

    let concurrency = match overrides.concurrency {
        Some(0) => {
            return Err(
                PipelineError::Configuration("concurrency must be at least 1".to_string()).into(),
            )
        }
        Some(n) => n,
        None => file.download.concurrency.unwrap_or(defaults.concurrency).max(1),
    };

    Ok(ResolvedConfig {
        cache_dir,
        cache_keep,
        size,
        concurrency,
        retry: file.download.retry.unwrap_or(defaults.retry),
        fetch_timeout: file
            .timeouts
            .fetch_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout),
        probe_timeout: Duration::from_secs(file.timeouts.probe_seconds.unwrap_or(60)),
        encode_timeout: Duration::from_secs(file.timeouts.encode_seconds.unwrap_or(3600)),
        tools: ToolPaths {
            fetcher: file.tools.fetcher.unwrap_or(tools.fetcher),
            probe: file.tools.probe.unwrap_or(tools.probe),
            encoder: file.tools.encoder.unwrap_or(tools.encoder),
        },
        config_file: config_path,
    })
}

/// Load configuration from all sources, command-line values first.
///
/// Not cached: every caller gets a fresh resolution.
pub fn load_config_with(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let config_path = find_config_file();
    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve_config(config_path, file, overrides, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| {
        load_config_with(&ConfigOverrides::default()).map_err(|e| format!("{:#}", e))
    });

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
