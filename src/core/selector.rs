//! Inclusion policy for candidate items.
//!
//! Selection is a pure filter over the source's ranking: items are never
//! reordered, and there are no retries.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::domain::{ContentItem, SelectionCriteria};

/// Still-image URLs, compiled once per process
fn still_image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.(png|jpe?g)(?:[?#].*)?$").expect("still-image pattern is valid")
    })
}

/// Why a candidate was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty URL")]
    EmptyUrl,

    #[error("tagged nsfw")]
    Nsfw,

    #[error("still image")]
    StillImage,
}

/// Applies the inclusion policy of a set of criteria
#[derive(Debug, Clone, Copy)]
pub struct PostSelector {
    allow_nsfw: bool,
    limit: usize,
}

impl PostSelector {
    pub fn new(criteria: &SelectionCriteria) -> Self {
        Self {
            allow_nsfw: criteria.allow_nsfw,
            limit: criteria.limit,
        }
    }

    /// Check one candidate against the policy
    pub fn check(&self, item: &ContentItem) -> Result<(), Rejection> {
        if item.url.trim().is_empty() {
            Err(Rejection::EmptyUrl)
        } else if item.nsfw && !self.allow_nsfw {
            Err(Rejection::Nsfw)
        } else if still_image_pattern().is_match(&item.url) {
            Err(Rejection::StillImage)
        } else {
            Ok(())
        }
    }

    /// Every candidate that passes the policy, in source order.
    ///
    /// This is not capped at `limit`: the downloader walks it to find
    /// alternates for failed fetches.
    pub fn eligible(&self, candidates: &[ContentItem]) -> Vec<ContentItem> {
        candidates
            .iter()
            .filter(|item| match self.check(item) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(id = %item.id, url = %item.url, %reason, "Skipping candidate");
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// The first `limit` eligible candidates, in source order
    pub fn select(&self, candidates: &[ContentItem]) -> Vec<ContentItem> {
        let mut selected = self.eligible(candidates);
        selected.truncate(self.limit);
        selected
    }
}
