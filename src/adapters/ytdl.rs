//! Media fetcher backed by `yt-dlp` (or a compatible `youtube-dl`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::process::{check_binary, run_with_deadline, stderr_text, ProcessFailure};
use super::{FetchError, MediaFetcher};

/// Container every fetched file is merged into
pub const MERGE_FORMAT: &str = "mp4";

/// Fetcher using the yt-dlp subprocess
pub struct YtdlFetcher {
    /// Path to the binary (default: "yt-dlp")
    binary_path: String,
}

impl Default for YtdlFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl YtdlFetcher {
    pub fn new() -> Self {
        Self::with_binary_path("yt-dlp")
    }

    /// Use a custom binary, e.g. `youtube-dl`
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Arguments for downloading `url` to `destination`
    fn fetch_args(url: &str, destination: &Path) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--output".to_string(),
            destination.to_string_lossy().into_owned(),
            "--merge-output-format".to_string(),
            MERGE_FORMAT.to_string(),
            url.to_string(),
        ]
    }

    /// Remove the destination and the downloader's `.part` sibling
    async fn remove_partial(destination: &Path) {
        let mut part = destination.as_os_str().to_owned();
        part.push(".part");
        for path in [destination.to_path_buf(), PathBuf::from(part)] {
            if tokio::fs::remove_file(&path).await.is_ok() {
                debug!(path = %path.display(), "Removed partial download");
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for YtdlFetcher {
    fn name(&self) -> &str {
        &self.binary_path
    }

    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let mut command = Command::new(&self.binary_path);
        command.args(Self::fetch_args(url, destination));

        let output = match run_with_deadline(command, timeout).await {
            Ok(output) => output,
            Err(ProcessFailure::Spawn(e)) => return Err(FetchError::Spawn(e)),
            Err(ProcessFailure::TimedOut(after)) => {
                Self::remove_partial(destination).await;
                return Err(FetchError::TimedOut(after));
            }
        };

        if !output.status.success() {
            Self::remove_partial(destination).await;
            return Err(FetchError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr_text(&output),
            });
        }

        if !destination.exists() {
            return Err(FetchError::MissingOutput(destination.to_path_buf()));
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        check_binary(&self.binary_path, "--version").await
    }
}
