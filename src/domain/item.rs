//! Content items and the criteria used to select them.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;

/// Upper bound on `SelectionCriteria::limit`
pub const MAX_LIMIT: usize = 100;

/// Page size always requested from the content source.
///
/// Filtering and fetch failures both shrink the usable yield, so the
/// source is asked for a full page regardless of `limit`.
pub const CANDIDATE_PAGE_SIZE: usize = 100;

/// One ranked post considered for inclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Stable, unique identifier (also the cache key)
    pub id: String,

    /// Media URL (may be empty for text posts)
    pub url: String,

    /// Post title
    pub title: String,

    /// Absolute link to the post itself
    pub permalink: String,

    /// Marked as not-safe-for-work by the source
    #[serde(default)]
    pub nsfw: bool,
}

impl ContentItem {
    /// Create a safe-for-work item
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        permalink: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            permalink: permalink.into(),
            nsfw: false,
        }
    }

    /// Mark the item as nsfw
    pub fn with_nsfw(mut self, nsfw: bool) -> Self {
        self.nsfw = nsfw;
        self
    }
}

/// Ranking used by the content source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Hot,
    Top,
    Rising,
    New,
    Controversial,
}

impl SortMode {
    /// Listing segment understood by the source
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hot => "hot",
            SortMode::Top => "top",
            SortMode::Rising => "rising",
            SortMode::New => "new",
            SortMode::Controversial => "controversial",
        }
    }

    /// Whether the ranking is scoped by a time window
    pub fn uses_time_window(&self) -> bool {
        match self {
            SortMode::Top | SortMode::Controversial => true,
            SortMode::Hot | SortMode::Rising | SortMode::New => false,
        }
    }
}

impl Default for SortMode {
    fn default() -> Self {
        Self::Hot
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window for windowed rankings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::Week
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusion policy and ordering for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    /// Source filter expression (e.g. `aww+gifs`)
    pub source_filter: String,

    pub sort: SortMode,

    pub time: TimeWindow,

    /// Maximum number of assets in the compiled video (1..=100)
    pub limit: usize,

    /// Allow items flagged nsfw
    pub allow_nsfw: bool,
}

impl SelectionCriteria {
    /// Build criteria, rejecting an out-of-range limit or empty filter
    pub fn new(
        source_filter: impl Into<String>,
        sort: SortMode,
        time: TimeWindow,
        limit: usize,
        allow_nsfw: bool,
    ) -> Result<Self, PipelineError> {
        let criteria = Self {
            source_filter: source_filter.into(),
            sort,
            time,
            limit,
            allow_nsfw,
        };
        criteria.validate()?;
        Ok(criteria)
    }

    /// Check the limit and filter expression
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(PipelineError::Configuration(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if self.source_filter.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "source filter cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
