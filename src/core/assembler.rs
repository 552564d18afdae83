//! Final encode of the normalized assets into the destination file.
//!
//! The encoder writes to a temporary file next to the destination, which
//! is renamed into place only after a clean encode. A failed or cancelled
//! encode therefore never leaves a file at the destination path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::error::PipelineError;
use super::graph::FilterGraph;
use crate::adapters::{EncodeJob, Encoder};
use crate::domain::MediaAsset;

/// Container metadata field carrying the provenance text
pub const PROVENANCE_METADATA_KEY: &str = "comment";

/// Invokes the encoder once per run
pub struct Assembler {
    encoder: Arc<dyn Encoder>,
    timeout: Duration,
}

impl Assembler {
    pub fn new(encoder: Arc<dyn Encoder>, timeout: Duration) -> Self {
        Self { encoder, timeout }
    }

    /// Describe the encode: asset files in order, the silent source
    /// last, both concat outputs mapped and optional provenance.
    pub fn job(
        assets: &[MediaAsset],
        graph: &FilterGraph,
        destination: &Path,
        provenance: Option<&str>,
    ) -> EncodeJob {
        EncodeJob {
            inputs: graph.encode_inputs(assets),
            filter_graph: graph.to_string(),
            mappings: graph.output_labels(),
            metadata: provenance
                .map(|text| vec![(PROVENANCE_METADATA_KEY.to_string(), text.to_string())])
                .unwrap_or_default(),
            destination: destination.to_path_buf(),
        }
    }

    /// Encode `assets` through `graph` into `destination`.
    ///
    /// Diagnostics from a failed encode are returned verbatim.
    pub async fn assemble(
        &self,
        assets: &[MediaAsset],
        graph: &FilterGraph,
        destination: &Path,
        provenance: Option<&str>,
    ) -> Result<PathBuf, PipelineError> {
        let staging = staging_file(destination)?;
        let job = Self::job(assets, graph, staging.path(), provenance);

        debug!(
            inputs = job.inputs.len(),
            staging = %staging.path().display(),
            filter_graph = %job.filter_graph,
            "Encoding"
        );

        // Dropping `staging` on error removes the partial output
        self.encoder
            .encode(&job, self.timeout)
            .await
            .map_err(|e| PipelineError::Encode {
                diagnostics: e.diagnostics(),
            })?;

        staging
            .persist(destination)
            .map_err(|e| PipelineError::Io(e.error))?;

        info!(output = %destination.display(), assets = assets.len(), "Encoded output");
        Ok(destination.to_path_buf())
    }
}

/// Temporary file in the destination's directory, with the same extension
/// so the encoder picks the same container format.
///
/// Created with the mode a plain file write would get (0666 less the
/// umask) since `persist` keeps it on the final output.
fn staging_file(destination: &Path) -> Result<tempfile::NamedTempFile, PipelineError> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let suffix = destination
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut builder = tempfile::Builder::new();
    builder.prefix(".reelmaker-").suffix(&suffix);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }

    Ok(builder.tempfile_in(dir)?)
}
