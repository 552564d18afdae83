//! reelmaker - Compile ranked Reddit posts into a single video
//!
//! Selects posts by policy, materializes their media into a local cache
//! and assembles them into one normalized, concatenated output with an
//! embedded provenance record.
//!
//! # Architecture
//!
//! A run is a fixed state machine:
//! - Pre-sweep the cache, retrieve and filter candidates
//! - Download up to `limit` assets on a bounded, order-preserving pool
//! - Probe every asset for audio and synthesize one filter graph
//! - Encode once, atomically, then sweep the cache again
//!
//! # Modules
//!
//! - `adapters`: External capabilities (Reddit, yt-dlp, ffprobe, ffmpeg)
//! - `core`: Pipeline logic (selector, cache, downloader, graph, assembler)
//! - `domain`: Data structures (ContentItem, MediaAsset, Run)
//! - `config`: Config file, environment and defaults
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Top 20 videos of the week from two subreddits, 1080p
//! reelmaker create best.mp4 --filter aww+gifs --sort top --time week -n 20 --size 1080p
//!
//! # Show resolved configuration
//! reelmaker config
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{Capabilities, Orchestrator, PipelineError, PipelineSettings};
pub use domain::{ContentItem, MediaAsset, OutputSize, Run, RunState, SelectionCriteria};
