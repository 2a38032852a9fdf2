//! # Sync Run State Machine
//!
//! Tracks one invocation of the sync engine with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//! Unauthenticated → Authenticating → ListingFetching → Merging → Done
//!                        │                 │              │
//!                        ├──→ Skipped      └──────────────┴──→ Failed
//!                        └──→ Failed
//! ```
//!
//! `Done`, `Skipped` and `Failed` are terminal. Only `Done` advances the
//! watermark.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync run, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidRunId(e.to_string()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Run State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Unauthenticated,
    Authenticating,
    ListingFetching,
    Merging,
    Done,
    Skipped,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Unauthenticated => "unauthenticated",
            RunState::Authenticating => "authenticating",
            RunState::ListingFetching => "listing_fetching",
            RunState::Merging => "merging",
            RunState::Done => "done",
            RunState::Skipped => "skipped",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Skipped | RunState::Failed)
    }
}

impl FromStr for RunState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unauthenticated" => Ok(RunState::Unauthenticated),
            "authenticating" => Ok(RunState::Authenticating),
            "listing_fetching" => Ok(RunState::ListingFetching),
            "merging" => Ok(RunState::Merging),
            "done" => Ok(RunState::Done),
            "skipped" => Ok(RunState::Skipped),
            "failed" => Ok(RunState::Failed),
            other => Err(SyncError::InvalidStateTransition {
                from: other.to_string(),
                to: other.to_string(),
                reason: format!("Unknown run state: {}", other),
            }),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Run Summary
// ============================================================================

/// One entry that did not make it into the store this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub entry_id: String,
    pub name: String,
    pub error: String,
    pub transient: bool,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub state: RunState,
    /// Entries returned by the listing
    pub listed: usize,
    /// Entries downloaded and persisted
    pub fetched: usize,
    /// Entries fetched again because they failed in an earlier run
    pub requeued: usize,
    /// Trashed entries whose records were removed
    pub evicted: usize,
    /// Folders ignored by the listing filter
    pub skipped: usize,
    pub failed: usize,
    /// Documents written into the file set
    pub merged: usize,
    pub failures: Vec<EntryFailure>,
    /// Watermark recorded by this run, if any
    pub watermark: Option<DateTime<Utc>>,
}

impl RunSummary {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            state: RunState::Unauthenticated,
            listed: 0,
            fetched: 0,
            requeued: 0,
            evicted: 0,
            skipped: 0,
            failed: 0,
            merged: 0,
            failures: Vec::new(),
            watermark: None,
        }
    }

    pub fn record_failure(&mut self, failure: EntryFailure) {
        self.failed += 1;
        self.failures.push(failure);
    }
}

// ============================================================================
// Sync Run
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: RunId,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub summary: RunSummary,
}

impl SyncRun {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        let id = RunId::new();
        Self {
            id,
            state: RunState::Unauthenticated,
            started_at,
            finished_at: None,
            error: None,
            summary: RunSummary::new(id),
        }
    }

    pub fn transition(&mut self, to: RunState, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(to)?;
        self.state = to;
        self.summary.state = to;
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Move to `Failed` from any non-terminal state.
    pub fn fail(&mut self, error: &SyncError, now: DateTime<Utc>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = RunState::Failed;
        self.summary.state = RunState::Failed;
        self.error = Some(error.to_string());
        self.finished_at = Some(now);
    }

    fn validate_transition(&self, to: RunState) -> Result<()> {
        let valid = match (self.state, to) {
            (RunState::Unauthenticated, RunState::Authenticating) => true,

            (RunState::Authenticating, RunState::ListingFetching) => true,
            (RunState::Authenticating, RunState::Skipped) => true,
            (RunState::Authenticating, RunState::Failed) => true,

            (RunState::ListingFetching, RunState::Merging) => true,
            (RunState::ListingFetching, RunState::Failed) => true,

            (RunState::Merging, RunState::Done) => true,
            (RunState::Merging, RunState::Failed) => true,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", self.state, to),
            });
        }

        Ok(())
    }
}
