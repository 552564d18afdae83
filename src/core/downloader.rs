//! Download orchestration.
//!
//! Walks eligible candidates in rank order and materializes each into
//! the cache until `limit` assets are available or the candidates run
//! out. Fetch failures skip the candidate and never abort the run.
//!
//! Fetches run on a bounded pool of tasks. Two things hold regardless of
//! completion order:
//! - results land in slots pre-assigned by candidate position, so the
//!   output keeps rank order;
//! - a fetch is only started while `successes + in_flight < limit`, so
//!   successes can never exceed `limit` and no fetch is wasted on a
//!   candidate that could not be used.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::CacheManager;
use super::retry::RetryPolicy;
use crate::adapters::{FetchError, MediaFetcher};
use crate::domain::{ContentItem, DownloadedItem};

/// Tuning for the download pool
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Maximum fetches in flight
    pub concurrency: usize,

    /// Deadline for a single fetch attempt
    pub fetch_timeout: Duration,

    /// Retry policy for failed fetches
    pub retry: RetryPolicy,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of a download pass
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    /// Successful assets in rank order (at most `limit`)
    pub items: Vec<DownloadedItem>,

    /// Candidates looked at (cache checked or fetch attempted)
    pub considered: usize,

    pub cached: usize,

    pub fetched: usize,

    pub failures: usize,
}

/// Turns selected items into local media files
pub struct DownloadOrchestrator {
    fetcher: Arc<dyn MediaFetcher>,
    cache: CacheManager,
    settings: DownloadSettings,
}

/// Removes a partially written file unless disarmed.
///
/// Covers errors, timeouts and task abortion alike: a cancelled fetch
/// must never leave a file that a later cache lookup would trust.
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartialFileGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.armed && std::fs::remove_file(&self.path).is_ok() {
            debug!(path = %self.path.display(), "Removed partial download");
        }
    }
}

impl DownloadOrchestrator {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        cache: CacheManager,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            fetcher,
            cache,
            settings,
        }
    }

    /// Materialize up to `limit` of `candidates`, in order
    pub async fn download(&self, candidates: &[ContentItem], limit: usize) -> DownloadOutcome {
        let concurrency = self.settings.concurrency.max(1);
        let mut outcome = DownloadOutcome::default();
        let mut slots: Vec<Option<DownloadedItem>> = vec![None; candidates.len()];
        let mut tasks: JoinSet<(usize, Result<(), FetchError>)> = JoinSet::new();
        let mut next = 0usize;
        let mut successes = 0usize;

        loop {
            while next < candidates.len()
                && successes + tasks.len() < limit
                && tasks.len() < concurrency
            {
                let index = next;
                next += 1;
                outcome.considered += 1;
                let item = &candidates[index];

                if let Some(path) = self.cache.get(&item.id).await {
                    debug!(id = %item.id, url = %item.url, "Already downloaded");
                    slots[index] = Some(DownloadedItem {
                        item: item.clone(),
                        path,
                        cached: true,
                    });
                    successes += 1;
                    outcome.cached += 1;
                    continue;
                }

                debug!(id = %item.id, url = %item.url, "Downloading");
                let fetcher = Arc::clone(&self.fetcher);
                let url = item.url.clone();
                let destination = self.cache.path_for(&item.id);
                let timeout = self.settings.fetch_timeout;
                let retry = self.settings.retry.clone();
                tasks.spawn(async move {
                    let result = fetch_with_retry(fetcher, &url, &destination, timeout, &retry).await;
                    (index, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((index, Ok(()))) => {
                    let item = candidates[index].clone();
                    info!(id = %item.id, url = %item.url, "Downloaded");

                    if let Err(e) = self.cache.write_metadata(&item).await {
                        warn!(id = %item.id, error = %e, "Failed to write metadata sidecar");
                    }

                    slots[index] = Some(DownloadedItem {
                        path: self.cache.path_for(&item.id),
                        item,
                        cached: false,
                    });
                    successes += 1;
                    outcome.fetched += 1;
                }
                Ok((index, Err(e))) => {
                    let item = &candidates[index];
                    warn!(id = %item.id, url = %item.url, error = %e, "Skipping candidate, fetch failed");
                    outcome.failures += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Fetch task aborted");
                    outcome.failures += 1;
                }
            }
        }

        outcome.items = slots.into_iter().flatten().collect();
        outcome
    }
}

/// Fetch one URL, retrying per policy.
///
/// The orchestrator enforces the deadline itself as well, so a fetcher
/// that ignores its timeout cannot stall the pool.
async fn fetch_with_retry(
    fetcher: Arc<dyn MediaFetcher>,
    url: &str,
    destination: &Path,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<(), FetchError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let guard = PartialFileGuard::new(destination);

        let fetched = tokio::time::timeout(timeout, fetcher.fetch(url, destination, timeout)).await;
        let result = match fetched {
            Ok(Ok(())) => {
                if tokio::fs::metadata(destination).await.is_ok() {
                    Ok(())
                } else {
                    Err(FetchError::MissingOutput(destination.to_path_buf()))
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::TimedOut(timeout)),
        };

        match result {
            Ok(()) => {
                guard.disarm();
                return Ok(());
            }
            Err(e) => {
                drop(guard);

                if retry.should_retry(attempt) {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return Err(e);
            }
        }
    }
}
