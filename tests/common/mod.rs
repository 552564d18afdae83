//! Deterministic fakes for the pipeline's external capabilities.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use reelmaker::adapters::{
    ContentSource, EncodeError, EncodeJob, Encoder, FetchError, MediaFetcher, MediaProbe,
    ProbeError, ProbeInfo,
};
use reelmaker::core::{Capabilities, DownloadSettings, PipelineSettings, RetryPolicy};
use reelmaker::domain::{ContentItem, SortMode, TimeWindow};

pub fn item(id: &str) -> ContentItem {
    ContentItem::new(
        id,
        format!("https://v.redd.it/{}", id),
        format!("Post {}", id),
        format!("https://www.reddit.com/r/test/comments/{}/", id),
    )
}

pub fn items(ids: &[&str]) -> Vec<ContentItem> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn ids<'a>(items: impl IntoIterator<Item = &'a ContentItem>) -> Vec<String> {
    items.into_iter().map(|i| i.id.clone()).collect()
}

/// Cache file stem of a path, i.e. the item id
fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Download settings without retry delays
pub fn fast_download(concurrency: usize) -> DownloadSettings {
    DownloadSettings {
        concurrency,
        fetch_timeout: Duration::from_secs(5),
        retry: RetryPolicy::none(),
    }
}

pub fn settings(cache_dir: &Path) -> PipelineSettings {
    let mut settings = PipelineSettings::new(cache_dir);
    settings.download = fast_download(4);
    settings.probe_timeout = Duration::from_secs(5);
    settings.encode_timeout = Duration::from_secs(5);
    settings
}

// ============================================================================
// Content source
// ============================================================================

pub struct StaticSource {
    items: Vec<ContentItem>,
    fail: bool,
    pub requests: Mutex<Vec<(String, SortMode, TimeWindow, usize)>>,
}

impl StaticSource {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_candidates(
        &self,
        source_filter: &str,
        sort: SortMode,
        time: TimeWindow,
        page_size: usize,
    ) -> Result<Vec<ContentItem>> {
        self.requests
            .lock()
            .unwrap()
            .push((source_filter.to_string(), sort, time, page_size));
        if self.fail {
            anyhow::bail!("listing unavailable");
        }
        Ok(self.items.clone())
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Writes a small file per URL and records every call
#[derive(Default)]
pub struct RecordingFetcher {
    /// URLs that always fail
    failing: HashSet<String>,
    /// URLs that fail on their first attempt only
    flaky: HashSet<String>,
    /// Per-URL artificial latency
    delays: HashMap<String, Duration>,
    /// Write this much of a file, then hang past any deadline
    hang_after_partial: HashSet<String>,
    healthy: bool,
    pub calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn flaky_on(mut self, url: impl Into<String>) -> Self {
        self.flaky.insert(url.into());
        self
    }

    pub fn hanging_on(mut self, url: impl Into<String>) -> Self {
        self.hang_after_partial.insert(url.into());
        self
    }

    pub fn with_delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl MediaFetcher for RecordingFetcher {
    fn name(&self) -> &str {
        "recording-fetcher"
    }

    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        _timeout: Duration,
    ) -> Result<(), FetchError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(url.to_string());
            calls.iter().filter(|u| *u == url).count()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        let result = if self.hang_after_partial.contains(url) {
            std::fs::write(destination, b"partial").unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        } else if self.failing.contains(url) || (self.flaky.contains(url) && attempt == 1) {
            Err(FetchError::Failed {
                code: 1,
                stderr: format!("ERROR: unsupported URL: {}", url),
            })
        } else {
            std::fs::write(destination, url.as_bytes()).unwrap();
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            anyhow::bail!("yt-dlp: command not found")
        }
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Reports audio for every file except the listed ids
#[derive(Default)]
pub struct ScriptedProbe {
    silent: HashSet<String>,
    failing: HashSet<String>,
    pub probed: Mutex<Vec<PathBuf>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent(mut self, id: &str) -> Self {
        self.silent.insert(id.to_string());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl MediaProbe for ScriptedProbe {
    fn name(&self) -> &str {
        "scripted-probe"
    }

    async fn probe(&self, path: &Path, _timeout: Duration) -> Result<ProbeInfo, ProbeError> {
        self.probed.lock().unwrap().push(path.to_path_buf());
        let id = stem(path);

        if self.failing.contains(&id) {
            return Err(ProbeError::Failed {
                code: 1,
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        Ok(ProbeInfo {
            has_audio: !self.silent.contains(&id),
            duration: Some(5.0),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Captures every job; writes the destination unless told to fail
#[derive(Default)]
pub struct CapturingEncoder {
    failure: Option<String>,
    pub jobs: Mutex<Vec<EncodeJob>>,
}

impl CapturingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail after writing partial output, with these diagnostics
    pub fn failing_with(diagnostics: &str) -> Self {
        Self {
            failure: Some(diagnostics.to_string()),
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> Vec<EncodeJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for CapturingEncoder {
    fn name(&self) -> &str {
        "capturing-encoder"
    }

    async fn encode(&self, job: &EncodeJob, _timeout: Duration) -> Result<(), EncodeError> {
        self.jobs.lock().unwrap().push(job.clone());
        std::fs::write(&job.destination, b"encoded").unwrap();

        match self.failure {
            Some(ref diagnostics) => Err(EncodeError::Failed {
                code: 1,
                diagnostics: diagnostics.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Fakes bundled as capabilities, keeping handles for assertions
pub struct Fakes {
    pub source: Arc<StaticSource>,
    pub fetcher: Arc<RecordingFetcher>,
    pub probe: Arc<ScriptedProbe>,
    pub encoder: Arc<CapturingEncoder>,
}

impl Fakes {
    pub fn new(
        source: StaticSource,
        fetcher: RecordingFetcher,
        probe: ScriptedProbe,
        encoder: CapturingEncoder,
    ) -> Self {
        Self {
            source: Arc::new(source),
            fetcher: Arc::new(fetcher),
            probe: Arc::new(probe),
            encoder: Arc::new(encoder),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            source: self.source.clone(),
            fetcher: self.fetcher.clone(),
            probe: self.probe.clone(),
            encoder: self.encoder.clone(),
        }
    }
}
