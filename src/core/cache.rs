//! Content-addressed media cache with time-based eviction.
//!
//! Every item lives at a deterministic path, `{dir}/{id}.{ext}`, with an
//! optional JSON sidecar at `{dir}/{id}.json`. A file at that path is
//! trusted as "already downloaded": it is never re-validated against the
//! source, and never hashed.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::fs;
use tracing::debug;

use super::error::PipelineError;
use crate::domain::ContentItem;

/// Name of the single-run lock file inside the cache directory
pub const LOCK_FILE: &str = ".reelmaker.lock";

/// Local media cache keyed by item id
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Cache directory
    dir: PathBuf,

    /// Media file extension (without the dot)
    extension: String,
}

/// Outcome of a sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed
    pub removed: usize,

    /// Entries younger than the retention window
    pub kept: usize,
}

/// Exclusive claim on a cache directory, released on drop
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl CacheManager {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// Get the cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory if needed
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    /// Deterministic media path for an item id.
    ///
    /// Bytes outside `[A-Za-z0-9-]`, `_` included, are written as `_xx`
    /// hex escapes. An id can never escape the cache directory and two
    /// distinct ids never share an entry.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", Self::file_key(id), self.extension))
    }

    /// Sidecar path holding the item record
    pub fn metadata_path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::file_key(id)))
    }

    fn file_key(id: &str) -> String {
        let mut key = String::with_capacity(id.len());
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                key.push(byte as char);
            } else {
                key.push_str(&format!("_{:02x}", byte));
            }
        }
        key
    }

    /// Cached media path, if the item has already been materialized
    pub async fn get(&self, id: &str) -> Option<PathBuf> {
        let path = self.path_for(id);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Write the item record next to its media file
    pub async fn write_metadata(&self, item: &ContentItem) -> Result<PathBuf> {
        let path = self.metadata_path_for(&item.id);
        let json = serde_json::to_string_pretty(item).context("Failed to serialize item")?;

        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write metadata: {}", path.display()))?;

        Ok(path)
    }

    /// Remove every entry whose modification time is at least `keep` old.
    ///
    /// Best-effort: unreadable directories, unstat-able entries and
    /// failed removals are skipped. Dotfiles (including the lock file)
    /// and subdirectories are never touched.
    pub async fn sweep(&self, keep: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "Cache sweep skipped");
                return report;
            }
        };

        let now = SystemTime::now();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(_) => break,
            };

            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };

            let Ok(modified) = meta.modified() else {
                continue;
            };

            // Timestamps in the future count as fresh
            let age = now.duration_since(modified).unwrap_or_default();
            if age < keep {
                report.kept += 1;
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), age_secs = age.as_secs(), "Evicted cache entry");
                    report.removed += 1;
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Failed to evict cache entry");
                }
            }
        }

        report
    }

    /// Claim the cache directory for a single run.
    ///
    /// Fails with `CacheLocked` if another process holds the claim.
    pub fn lock(&self) -> Result<CacheLock, PipelineError> {
        let path = self.dir.join(LOCK_FILE);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| PipelineError::CacheLocked(self.dir.clone()))?;

        Ok(CacheLock { file, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_deterministic_paths() {
        let cache = CacheManager::new("/var/cache/reelmaker", "mp4");
        assert_eq!(
            cache.path_for("abc123"),
            PathBuf::from("/var/cache/reelmaker/abc123.mp4")
        );
        assert_eq!(
            cache.metadata_path_for("abc123"),
            PathBuf::from("/var/cache/reelmaker/abc123.json")
        );
    }

    #[test]
    fn test_ids_cannot_escape_directory() {
        let cache = CacheManager::new("/c", "mp4");
        assert_eq!(
            cache.path_for("../etc/passwd"),
            PathBuf::from("/c/_2e_2e_2fetc_2fpasswd.mp4")
        );
    }

    #[test]
    fn test_distinct_ids_never_share_an_entry() {
        let cache = CacheManager::new("/c", "mp4");
        let ids = ["x.y", "x_y", "x_2ey", "x-y", "xy", "x y"];

        let paths: std::collections::HashSet<PathBuf> =
            ids.iter().map(|id| cache.path_for(id)).collect();
        assert_eq!(paths.len(), ids.len());

        assert_eq!(cache.path_for("x.y"), PathBuf::from("/c/x_2ey.mp4"));
        assert_eq!(cache.path_for("x_y"), PathBuf::from("/c/x_5fy.mp4"));
        assert_eq!(cache.metadata_path_for("x_y"), PathBuf::from("/c/x_5fy.json"));
    }

    #[tokio::test]
    async fn test_get_hit_and_miss() {
        let temp = TempDir::new().unwrap();
        let cache = CacheManager::new(temp.path(), "mp4");

        assert!(cache.get("abc").await.is_none());

        std::fs::write(temp.path().join("abc.mp4"), b"media").unwrap();
        assert_eq!(cache.get("abc").await, Some(temp.path().join("abc.mp4")));

        // A directory at the path is not a hit
        std::fs::create_dir(temp.path().join("dir.mp4")).unwrap();
        assert!(cache.get("dir").await.is_none());
    }

    #[tokio::test]
    async fn test_metadata_sidecar() {
        let temp = TempDir::new().unwrap();
        let cache = CacheManager::new(temp.path(), "mp4");
        let item = ContentItem::new("abc", "https://v.redd.it/abc", "Title", "https://r/abc");

        let path = cache.write_metadata(&item).await.unwrap();
        let loaded: ContentItem =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded, item);
    }

    #[tokio::test]
    async fn test_sweep_missing_dir_is_silent() {
        let cache = CacheManager::new("/nonexistent/reelmaker-cache", "mp4");
        assert_eq!(cache.sweep(Duration::ZERO).await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let cache = CacheManager::new(temp.path(), "mp4");

        let lock = cache.lock().unwrap();
        assert!(lock.path().ends_with(LOCK_FILE));
        assert!(matches!(cache.lock(), Err(PipelineError::CacheLocked(_))));

        drop(lock);
        assert!(cache.lock().is_ok());
    }
}
