//! Core pipeline logic.
//!
//! This module contains:
//! - Selector: inclusion policy over ranked candidates
//! - Cache: content-addressed media storage with TTL eviction
//! - Downloader: bounded, order-preserving fetch pool
//! - Graph: filter graph synthesis and serialization
//! - Assembler: the final encode
//! - Orchestrator: the run state machine

pub mod assembler;
pub mod cache;
pub mod downloader;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod provenance;
pub mod retry;
pub mod selector;

// Re-export commonly used types
pub use assembler::{Assembler, PROVENANCE_METADATA_KEY};
pub use cache::{CacheLock, CacheManager, SweepReport, LOCK_FILE};
pub use downloader::{DownloadOrchestrator, DownloadOutcome, DownloadSettings};
pub use error::PipelineError;
pub use graph::{FilterGraph, FilterGraphBuilder};
pub use orchestrator::{Capabilities, Orchestrator, PipelineSettings, MEDIA_EXTENSION};
pub use provenance::{ProvenanceRecord, TOOL_VERSION};
pub use retry::RetryPolicy;
pub use selector::{PostSelector, Rejection};
