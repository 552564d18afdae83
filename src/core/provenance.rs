//! Human-readable inclusion record embedded in the output container.

use std::fmt;

use serde::Serialize;

use crate::domain::{MediaAsset, SelectionCriteria, SortMode, TimeWindow};

/// Tool version stamped into every record
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One included asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceEntry {
    /// 1-based inclusion rank
    pub rank: usize,
    pub title: String,
    pub permalink: String,
    pub url: String,
}

/// What went into an output file, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceRecord {
    pub version: String,
    pub source_filter: String,
    pub sort: SortMode,
    pub time: TimeWindow,
    pub entries: Vec<ProvenanceEntry>,
}

impl ProvenanceRecord {
    /// Record for the assets that made it into the output, in inclusion order
    pub fn new(criteria: &SelectionCriteria, assets: &[MediaAsset]) -> Self {
        let entries = assets
            .iter()
            .enumerate()
            .map(|(i, asset)| ProvenanceEntry {
                rank: i + 1,
                title: asset.item.title.clone(),
                permalink: asset.item.permalink.clone(),
                url: asset.item.url.clone(),
            })
            .collect();

        Self {
            version: TOOL_VERSION.to_string(),
            source_filter: criteria.source_filter.clone(),
            sort: criteria.sort,
            time: criteria.time,
            entries,
        }
    }
}

impl fmt::Display for ProvenanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Created with reelmaker {}", self.version)?;
        writeln!(
            f,
            "Source: r/{} (sort: {}, time: {})",
            self.source_filter,
            self.sort.as_str(),
            self.time.as_str()
        )?;

        for entry in &self.entries {
            writeln!(f)?;
            writeln!(f, "{}. {}", entry.rank, entry.title)?;
            writeln!(f, "   {}", entry.permalink)?;
            write!(f, "   {}", entry.url)?;
        }

        Ok(())
    }
}
