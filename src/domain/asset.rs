//! Locally materialized media and the output box they are fitted into.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::item::ContentItem;

/// A content item whose media exists in the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedItem {
    pub item: ContentItem,

    /// Deterministic cache path (`cacheDir/{id}.{ext}`)
    pub path: PathBuf,

    /// True if the file was already present before this run
    pub cached: bool,
}

/// A downloaded item that has been probed
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub item: ContentItem,

    pub path: PathBuf,

    /// Whether the file carries at least one audio stream
    pub has_audio: bool,

    /// Container duration in seconds, if reported
    pub duration: Option<f64>,
}

impl MediaAsset {
    pub fn new(downloaded: DownloadedItem, has_audio: bool, duration: Option<f64>) -> Self {
        Self {
            item: downloaded.item,
            path: downloaded.path,
            has_audio,
            duration,
        }
    }
}

/// Output frame dimensions every asset is normalized to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for OutputSize {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
