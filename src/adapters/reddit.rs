//! Reddit listing API as a content source.
//!
//! Uses the public JSON listings (`/r/{filter}/{sort}.json`), so no
//! credentials are required. The filter expression may combine several
//! subreddits with `+`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::ContentSource;
use crate::domain::{ContentItem, SortMode, TimeWindow, CANDIDATE_PAGE_SIZE};

/// Default API origin
pub const REDDIT_BASE_URL: &str = "https://www.reddit.com";

/// Deadline for one listing request, connect to last body byte
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

/// Reddit listing client
pub struct RedditSource {
    /// API origin, overridable for tests and mirrors
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Listing envelope
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RawPost,
}

/// Post fields we care about
#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    over_18: bool,
}

impl Default for RedditSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RedditSource {
    pub fn new() -> Self {
        Self::with_base_url(REDDIT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Self::client(LISTING_TIMEOUT),
        }
    }

    /// Replace the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Self::client(timeout);
        self
    }

    fn client(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(concat!("reelmaker/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_default()
    }

    /// Listing URL for a sort mode
    fn listing_url(
        &self,
        source_filter: &str,
        sort: SortMode,
        time: TimeWindow,
        page_size: usize,
    ) -> String {
        let page_size = page_size.min(CANDIDATE_PAGE_SIZE);
        let base = format!(
            "{}/r/{}/{}.json?limit={}&raw_json=1",
            self.base_url,
            source_filter,
            sort.as_str(),
            page_size
        );

        if sort.uses_time_window() {
            format!("{}&t={}", base, time.as_str())
        } else {
            base
        }
    }

    /// Turn a raw post into a content item with an absolute permalink
    fn to_item(&self, post: RawPost) -> ContentItem {
        let permalink = if post.permalink.starts_with('/') {
            format!("{}{}", self.base_url, post.permalink)
        } else {
            post.permalink
        };

        ContentItem::new(post.id, post.url.unwrap_or_default(), post.title, permalink)
            .with_nsfw(post.over_18)
    }

    /// Parse a listing body, preserving rank order
    fn parse_listing(&self, body: &str) -> Result<Vec<ContentItem>> {
        let listing: Listing =
            serde_json::from_str(body).context("Failed to parse Reddit listing")?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| self.to_item(child.data))
            .collect())
    }
}

#[async_trait]
impl ContentSource for RedditSource {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn fetch_candidates(
        &self,
        source_filter: &str,
        sort: SortMode,
        time: TimeWindow,
        page_size: usize,
    ) -> Result<Vec<ContentItem>> {
        let url = self.listing_url(source_filter, sort, time, page_size);
        debug!(%url, "Fetching listing");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Reddit returned {} for {}", status, url);
        }

        let body = response
            .text()
            .await
            .context("Failed to read Reddit response body")?;

        self.parse_listing(&body)
    }
}
