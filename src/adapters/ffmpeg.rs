//! Encoder backed by `ffmpeg`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use super::process::{check_binary, run_with_deadline, stderr_text, ProcessFailure};
use super::{EncodeError, EncodeInput, EncodeJob, Encoder};

/// Encoder using the ffmpeg subprocess
pub struct FfmpegEncoder {
    binary_path: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::with_binary_path("ffmpeg")
    }

    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build the ffmpeg argument list for a job.
    ///
    /// Logging is limited to errors so that anything on stderr is a
    /// diagnostic.
    pub fn build_args(job: &EncodeJob) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for input in &job.inputs {
            match input {
                EncodeInput::File(path) => {
                    args.push("-i".to_string());
                    args.push(path.to_string_lossy().into_owned());
                }
                EncodeInput::Synthetic {
                    source,
                    duration_secs,
                } => {
                    args.push("-f".to_string());
                    args.push("lavfi".to_string());
                    args.push("-t".to_string());
                    args.push(duration_secs.to_string());
                    args.push("-i".to_string());
                    args.push(source.clone());
                }
            }
        }

        args.push("-filter_complex".to_string());
        args.push(job.filter_graph.clone());

        for label in &job.mappings {
            args.push("-map".to_string());
            args.push(format!("[{}]", label));
        }

        for (key, value) in &job.metadata {
            args.push("-metadata".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(job.destination.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        &self.binary_path
    }

    async fn encode(&self, job: &EncodeJob, timeout: Duration) -> Result<(), EncodeError> {
        let mut command = Command::new(&self.binary_path);
        command.args(Self::build_args(job));

        let output = run_with_deadline(command, timeout)
            .await
            .map_err(|failure| match failure {
                ProcessFailure::Spawn(e) => EncodeError::Spawn(e),
                ProcessFailure::TimedOut(after) => EncodeError::TimedOut(after),
            })?;

        let diagnostics = stderr_text(&output);

        if !output.status.success() {
            return Err(EncodeError::Failed {
                code: output.status.code().unwrap_or(-1),
                diagnostics,
            });
        }

        if !diagnostics.is_empty() {
            return Err(EncodeError::Diagnostics(diagnostics));
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        check_binary(&self.binary_path, "-version").await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn job() -> EncodeJob {
        EncodeJob {
            inputs: vec![
                EncodeInput::File(PathBuf::from("/cache/a.mp4")),
                EncodeInput::File(PathBuf::from("/cache/b.mp4")),
                EncodeInput::Synthetic {
                    source: "anullsrc".to_string(),
                    duration_secs: 0.1,
                },
            ],
            filter_graph: "[v0][0:a][v1][2:a]concat=n=2:v=1:a=1[v][a]".to_string(),
            mappings: vec!["v".to_string(), "a".to_string()],
            metadata: vec![("comment".to_string(), "made by reelmaker".to_string())],
            destination: PathBuf::from("/out/video.mp4"),
        }
    }

    #[test]
    fn test_inputs_in_order_with_silence_last() {
        let args = FfmpegEncoder::build_args(&job());
        let inputs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-i")
            .map(|(_, a)| a)
            .collect();

        assert_eq!(inputs, ["/cache/a.mp4", "/cache/b.mp4", "anullsrc"]);

        let lavfi = args.iter().position(|a| a == "lavfi").unwrap();
        assert_eq!(args[lavfi - 1], "-f");
        assert_eq!(args[lavfi + 1], "-t");
        assert_eq!(args[lavfi + 2], "0.1");
    }

    #[test]
    fn test_mappings_metadata_and_destination() {
        let args = FfmpegEncoder::build_args(&job());

        let maps: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-map")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(maps, ["[v]", "[a]"]);

        let meta = args.iter().position(|a| a == "-metadata").unwrap();
        assert_eq!(args[meta + 1], "comment=made by reelmaker");

        assert_eq!(args.last().unwrap(), "/out/video.mp4");
        assert!(args.contains(&"-filter_complex".to_string()));
        assert!(args.contains(&"error".to_string()));
    }

    /// Executable shell script standing in for ffmpeg
    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_on_zero_exit_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let encoder = FfmpegEncoder::with_binary_path(script(
            &dir,
            "echo '[mp4 @ 0x1] Non-monotonic DTS in output stream 0:1' >&2\nexit 0",
        ));

        let err = encoder
            .encode(&job(), Duration::from_secs(10))
            .await
            .unwrap_err();

        match err {
            EncodeError::Diagnostics(text) => {
                assert_eq!(text, "[mp4 @ 0x1] Non-monotonic DTS in output stream 0:1")
            }
            other => panic!("expected diagnostics, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_keeps_diagnostics() {
        let dir = tempfile::TempDir::new().unwrap();
        let encoder = FfmpegEncoder::with_binary_path(script(
            &dir,
            "echo 'Invalid argument' >&2\nexit 1",
        ));

        let err = encoder
            .encode(&job(), Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_eq!(err.diagnostics(), "Invalid argument");
        assert!(matches!(err, EncodeError::Failed { code: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let encoder = FfmpegEncoder::with_binary_path(script(&dir, "exit 0"));

        assert!(encoder.encode(&job(), Duration::from_secs(10)).await.is_ok());
    }
}
