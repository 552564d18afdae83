//! Error taxonomy for a pipeline run.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that end a run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Required tool '{tool}' is unavailable: {reason}")]
    DependencyMissing { tool: String, reason: String },

    #[error("Cache directory {0} is in use by another run")]
    CacheLocked(PathBuf),

    #[error("Failed to retrieve candidates: {0}")]
    Source(String),

    #[error("No usable media among {considered} eligible candidates")]
    NoUsableAssets { considered: usize },

    #[error("Failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Encoding failed: {diagnostics}")]
    Encode { diagnostics: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Raised before any pipeline activity
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}
