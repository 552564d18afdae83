//! Main orchestrator for a compilation run.
//!
//! Drives the run state machine: dependency checks, cache lock and
//! pre-sweep, candidate retrieval and selection, downloads, probing,
//! graph synthesis, encoding and post-sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{ContentSource, Encoder, MediaFetcher, MediaProbe};
use crate::domain::{OutputSize, Run, RunState, SelectionCriteria, CANDIDATE_PAGE_SIZE};

use super::assembler::Assembler;
use super::cache::CacheManager;
use super::downloader::{DownloadOrchestrator, DownloadSettings};
use super::error::PipelineError;
use super::graph::FilterGraphBuilder;
use super::provenance::ProvenanceRecord;
use super::selector::PostSelector;

/// Extension of cached media files
pub const MEDIA_EXTENSION: &str = "mp4";

/// External systems the pipeline talks to
#[derive(Clone)]
pub struct Capabilities {
    pub source: Arc<dyn ContentSource>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub probe: Arc<dyn MediaProbe>,
    pub encoder: Arc<dyn Encoder>,
}

/// Knobs for a run that are not part of the selection policy
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cache_dir: PathBuf,

    /// Cache entries at least this old are evicted
    pub cache_keep: Duration,

    pub size: OutputSize,

    pub download: DownloadSettings,

    pub probe_timeout: Duration,

    pub encode_timeout: Duration,
}

impl PipelineSettings {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            cache_keep: Duration::from_secs(30 * 24 * 3600),
            size: OutputSize::default(),
            download: DownloadSettings::default(),
            probe_timeout: Duration::from_secs(60),
            encode_timeout: Duration::from_secs(3600),
        }
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    capabilities: Capabilities,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(capabilities: Capabilities, settings: PipelineSettings) -> Self {
        Self {
            capabilities,
            settings,
        }
    }

    /// Verify every external tool is reachable
    pub async fn check_dependencies(&self) -> Result<(), PipelineError> {
        let caps = &self.capabilities;
        let (fetcher, probe, encoder) = tokio::join!(
            caps.fetcher.health_check(),
            caps.probe.health_check(),
            caps.encoder.health_check(),
        );

        for (tool, result) in [
            (caps.fetcher.name(), fetcher),
            (caps.probe.name(), probe),
            (caps.encoder.name(), encoder),
        ] {
            if let Err(e) = result {
                return Err(PipelineError::DependencyMissing {
                    tool: tool.to_string(),
                    reason: format!("{:#}", e),
                });
            }
        }

        Ok(())
    }

    /// Compile the items selected by `criteria` into `output`.
    ///
    /// Returns the finished run report; a fatal error is returned as-is
    /// after the post-run sweep.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, filter = %criteria.source_filter))]
    pub async fn run(
        &self,
        criteria: &SelectionCriteria,
        output: &Path,
    ) -> Result<Run, PipelineError> {
        criteria.validate()?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(sort = %criteria.sort, time = %criteria.time, limit = criteria.limit, "Starting run");

        let mut run = Run::new(run_id, &criteria.source_filter);

        // Nothing touches the cache or network before this passes
        if let Err(e) = self.check_dependencies().await {
            return Err(Self::fail(&mut run, e));
        }

        let cache = CacheManager::new(&self.settings.cache_dir, MEDIA_EXTENSION);
        if let Err(e) = cache.ensure_dir().await {
            return Err(Self::fail(&mut run, e.into()));
        }
        let _lock = match cache.lock() {
            Ok(lock) => lock,
            Err(e) => return Err(Self::fail(&mut run, e)),
        };

        let result = self.execute(&mut run, criteria, output, &cache).await;

        let swept = cache.sweep(self.settings.cache_keep).await;
        info!(removed = swept.removed, kept = swept.kept, "Post-run cache sweep");

        match result {
            Ok(path) => {
                run.output = Some(path);
                run.advance(RunState::CacheSwept);
                run.advance(RunState::Done);
                info!(
                    output = ?run.output,
                    assets = run.stats.assets(),
                    shortfall = run.stats.shortfall,
                    "Run completed successfully"
                );
                Ok(run)
            }
            Err(e) => Err(Self::fail(&mut run, e)),
        }
    }

    async fn execute(
        &self,
        run: &mut Run,
        criteria: &SelectionCriteria,
        output: &Path,
        cache: &CacheManager,
    ) -> Result<PathBuf, PipelineError> {
        let swept = cache.sweep(self.settings.cache_keep).await;
        info!(removed = swept.removed, kept = swept.kept, "Pre-run cache sweep");
        run.advance(RunState::CacheWarmed);

        let source = &self.capabilities.source;
        let candidates = source
            .fetch_candidates(
                &criteria.source_filter,
                criteria.sort,
                criteria.time,
                CANDIDATE_PAGE_SIZE,
            )
            .await
            .map_err(|e| PipelineError::Source(format!("{}: {:#}", source.name(), e)))?;

        let selector = PostSelector::new(criteria);
        let eligible = selector.eligible(&candidates);
        run.stats.candidates = candidates.len();
        run.stats.eligible = eligible.len();
        if eligible.len() < criteria.limit {
            warn!(
                eligible = eligible.len(),
                limit = criteria.limit,
                "Fewer eligible candidates than requested"
            );
        }
        info!(candidates = candidates.len(), eligible = eligible.len(), "Selected candidates");
        run.advance(RunState::Selected);

        let downloader = DownloadOrchestrator::new(
            Arc::clone(&self.capabilities.fetcher),
            cache.clone(),
            self.settings.download.clone(),
        );
        let downloaded = downloader.download(&eligible, criteria.limit).await;
        run.stats.cached = downloaded.cached;
        run.stats.fetched = downloaded.fetched;
        run.stats.fetch_failures = downloaded.failures;
        run.stats.shortfall = criteria.limit.saturating_sub(downloaded.items.len());

        if downloaded.items.is_empty() {
            return Err(PipelineError::NoUsableAssets {
                considered: downloaded.considered,
            });
        }
        if run.stats.shortfall > 0 {
            warn!(
                assets = downloaded.items.len(),
                limit = criteria.limit,
                "Compiling fewer assets than requested"
            );
        }
        info!(
            cached = downloaded.cached,
            fetched = downloaded.fetched,
            failures = downloaded.failures,
            "Downloads finished"
        );
        run.advance(RunState::Downloaded);

        let builder = FilterGraphBuilder::new(
            Arc::clone(&self.capabilities.probe),
            self.settings.size,
            self.settings.probe_timeout,
        );
        let assets = builder.probe_all(downloaded.items).await?;
        info!(assets = assets.len(), "Probed assets");
        run.advance(RunState::Probed);

        let graph = builder.build(&assets)?;
        run.advance(RunState::GraphBuilt);

        let provenance = ProvenanceRecord::new(criteria, &assets).to_string();
        let assembler = Assembler::new(
            Arc::clone(&self.capabilities.encoder),
            self.settings.encode_timeout,
        );
        let path = assembler
            .assemble(&assets, &graph, output, Some(&provenance))
            .await?;
        run.advance(RunState::Encoded);

        Ok(path)
    }

    fn fail(run: &mut Run, error: PipelineError) -> PipelineError {
        error!(error = %error, state = ?run.state, "Run failed");
        run.fail(error.to_string());
        error
    }
}
