//! Capability interfaces for external systems.
//!
//! The pipeline never shells out or talks to the network directly; it
//! goes through these narrow traits so tests can substitute
//! deterministic fakes.

pub mod ffmpeg;
pub mod ffprobe;
pub mod process;
pub mod reddit;
pub mod ytdl;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ContentItem, SortMode, TimeWindow};

// Re-export the default implementations
pub use ffmpeg::FfmpegEncoder;
pub use ffprobe::FfprobeProbe;
pub use reddit::RedditSource;
pub use ytdl::YtdlFetcher;

/// Ranked source of candidate items
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Retrieve one page of candidates, ranked by the source
    async fn fetch_candidates(
        &self,
        source_filter: &str,
        sort: SortMode,
        time: TimeWindow,
        page_size: usize,
    ) -> Result<Vec<ContentItem>>;
}

/// Materializes remote media into a local file
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Download `url` to exactly `destination`.
    ///
    /// On error no usable file may remain at `destination`.
    async fn fetch(&self, url: &str, destination: &Path, timeout: Duration)
        -> Result<(), FetchError>;

    /// Verify the backing tool is reachable
    async fn health_check(&self) -> Result<()>;
}

/// Stream-level facts about a local media file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
    pub has_audio: bool,

    /// Duration in seconds, if the container reports one
    pub duration: Option<f64>,
}

/// Inspects local media files
#[async_trait]
pub trait MediaProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self, path: &Path, timeout: Duration) -> Result<ProbeInfo, ProbeError>;

    async fn health_check(&self) -> Result<()>;
}

/// One input of an encode invocation
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeInput {
    /// A media file on disk
    File(PathBuf),

    /// A generated source (e.g. `anullsrc`) of fixed duration
    Synthetic { source: String, duration_secs: f64 },
}

/// Everything the encoder needs for a single invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    /// Inputs in index order
    pub inputs: Vec<EncodeInput>,

    /// Serialized filter graph expression
    pub filter_graph: String,

    /// Output stream labels to map, in order
    pub mappings: Vec<String>,

    /// Container metadata fields
    pub metadata: Vec<(String, String)>,

    /// Path the encoder writes to
    pub destination: PathBuf,
}

/// Runs the filter graph and writes the output file
#[async_trait]
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    async fn encode(&self, job: &EncodeJob, timeout: Duration) -> Result<(), EncodeError>;

    async fn health_check(&self) -> Result<()>;
}

/// Failure to materialize one item
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to start fetcher: {0}")]
    Spawn(std::io::Error),

    #[error("Fetcher exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Fetcher reported success but {0} does not exist")]
    MissingOutput(PathBuf),
}

/// Failure to inspect a file (distinct from "no audio")
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to start probe: {0}")]
    Spawn(std::io::Error),

    #[error("Probe exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Probe timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Unreadable probe output: {0}")]
    Parse(String),
}

/// Failure of the final encode
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to start encoder: {0}")]
    Spawn(std::io::Error),

    #[error("Encoder exited with code {code}: {diagnostics}")]
    Failed { code: i32, diagnostics: String },

    /// Exit status was zero but the encoder still complained
    #[error("{0}")]
    Diagnostics(String),

    #[error("Encode timed out after {0:?}")]
    TimedOut(Duration),
}

impl EncodeError {
    /// Diagnostic text to surface verbatim
    pub fn diagnostics(&self) -> String {
        match self {
            EncodeError::Failed { diagnostics, .. } => diagnostics.clone(),
            EncodeError::Diagnostics(diagnostics) => diagnostics.clone(),
            other => other.to_string(),
        }
    }
}
