//! Run state for a single compilation.
//!
//! A run walks a fixed sequence of states:
//!
//! ```text
//! Idle -> CacheWarmed -> Selected -> Downloaded -> Probed -> GraphBuilt
//!      -> Encoded -> CacheSwept -> Done
//! ```
//!
//! Any non-terminal state may drop into `Failed`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// A pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Source filter expression the run was started with
    pub source_filter: String,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    /// Counters collected along the way
    pub stats: RunStats,

    /// Written output file, once encoded
    pub output: Option<PathBuf>,
}

/// Counters for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Candidates returned by the content source
    pub candidates: usize,

    /// Candidates that passed the inclusion policy
    pub eligible: usize,

    /// Assets served from the cache
    pub cached: usize,

    /// Assets fetched during this run
    pub fetched: usize,

    /// Candidates skipped because their fetch failed
    pub fetch_failures: usize,

    /// How many assets short of `limit` the run ended up
    pub shortfall: usize,
}

impl RunStats {
    /// Total assets that made it into the cache
    pub fn assets(&self) -> usize {
        self.cached + self.fetched
    }
}

impl Run {
    /// Create a new idle run
    pub fn new(id: Uuid, source_filter: impl Into<String>) -> Self {
        Self {
            id,
            source_filter: source_filter.into(),
            state: RunState::Idle,
            started_at: Utc::now(),
            completed_at: None,
            stats: RunStats::default(),
            output: None,
        }
    }

    /// Move to the next state.
    ///
    /// Out-of-order transitions are logged and ignored; terminal states
    /// never change.
    pub fn advance(&mut self, next: RunState) {
        if !self.state.can_advance_to(&next) {
            warn!(from = ?self.state, to = ?next, "Ignoring illegal run state transition");
            return;
        }

        debug!(from = ?self.state, to = ?next, "Run state transition");
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.state = next;
    }

    /// Fail the run with an error message
    pub fn fail(&mut self, error: impl Into<String>) {
        self.advance(RunState::Failed {
            error: error.into(),
        });
    }

    /// Check if the run has finished
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Duration of the run in seconds (if finished)
    pub fn duration_seconds(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

/// State of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,

    /// Expired cache entries reclaimed before the run
    CacheWarmed,

    /// Candidates retrieved and filtered
    Selected,

    /// Between 0 and `limit` assets are on disk
    Downloaded,

    /// Every downloaded asset has known audio presence
    Probed,

    /// Filter graph synthesized
    GraphBuilt,

    /// Output file written
    Encoded,

    /// Expired cache entries reclaimed after the run
    CacheSwept,

    Done,

    Failed { error: String },
}

impl RunState {
    /// Position in the happy path, `None` for `Failed`
    fn ordinal(&self) -> Option<u8> {
        Some(match self {
            RunState::Idle => 0,
            RunState::CacheWarmed => 1,
            RunState::Selected => 2,
            RunState::Downloaded => 3,
            RunState::Probed => 4,
            RunState::GraphBuilt => 5,
            RunState::Encoded => 6,
            RunState::CacheSwept => 7,
            RunState::Done => 8,
            RunState::Failed { .. } => return None,
        })
    }

    /// Check whether a transition to `next` is legal
    pub fn can_advance_to(&self, next: &RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }

    /// `Done` and `Failed` are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}
