//! Domain types for reelmaker.
//!
//! This module contains the core data structures:
//! - Items: ranked posts and the criteria used to select them
//! - Assets: downloaded and probed media, output dimensions
//! - Run: pipeline execution state

pub mod asset;
pub mod item;
pub mod run;

// Re-export commonly used types
pub use asset::{DownloadedItem, MediaAsset, OutputSize};
pub use item::{
    ContentItem, SelectionCriteria, SortMode, TimeWindow, CANDIDATE_PAGE_SIZE, MAX_LIMIT,
};
pub use run::{Run, RunState, RunStats};
