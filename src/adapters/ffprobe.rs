//! Media probe backed by `ffprobe`.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::process::{check_binary, run_with_deadline, stderr_text, ProcessFailure};
use super::{MediaProbe, ProbeError, ProbeInfo};

/// Probe using the ffprobe subprocess
pub struct FfprobeProbe {
    binary_path: String,
}

/// ffprobe `-of json` output (only the fields we read)
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    /// ffprobe reports durations as strings
    duration: Option<String>,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self::with_binary_path("ffprobe")
    }

    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Interpret ffprobe's JSON report
    fn parse(stdout: &[u8]) -> Result<ProbeInfo, ProbeError> {
        let report: FfprobeOutput =
            serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

        let has_audio = report.streams.iter().any(|s| s.codec_type == "audio");
        let duration = report
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok());

        Ok(ProbeInfo {
            has_audio,
            duration,
        })
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    fn name(&self) -> &str {
        &self.binary_path
    }

    async fn probe(&self, path: &Path, timeout: Duration) -> Result<ProbeInfo, ProbeError> {
        let mut command = Command::new(&self.binary_path);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=codec_type:format=duration",
                "-of",
                "json",
            ])
            .arg(path);

        let output = run_with_deadline(command, timeout)
            .await
            .map_err(|failure| match failure {
                ProcessFailure::Spawn(e) => ProbeError::Spawn(e),
                ProcessFailure::TimedOut(after) => ProbeError::TimedOut(after),
            })?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr_text(&output),
            });
        }

        Self::parse(&output.stdout)
    }

    async fn health_check(&self) -> Result<()> {
        check_binary(&self.binary_path, "-version").await
    }
}
