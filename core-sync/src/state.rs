//! # Sync State
//!
//! Process-wide record of what the sync engine has done. Starts as
//! "unknown / never synced", is driven only by the engine, and returns to the
//! initial value on an explicit cache clear.
//!
//! ```text
//! Unknown ──run──▶ Success ──run──▶ Partial ──run──▶ Failed ──run──▶ ...
//!    ▲                                                              │
//!    └──────────────────────── reset (cache clear) ─────────────────┘
//! ```

use crate::error::SyncFailure;
use core_library::PersistedSyncState;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    ColdStart,
    Background,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::ColdStart => "cold_start",
            SyncTrigger::Background => "background",
            SyncTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    #[default]
    Unknown,
    Success {
        songs: u64,
        setlist_items: u64,
        gigs: u64,
    },
    /// Songs were committed, a later stage failed.
    Partial { reason: SyncFailure },
    /// Nothing was written.
    Failed { reason: SyncFailure },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&SyncFailure> {
        match self {
            SyncOutcome::Partial { reason } | SyncOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Unix milliseconds of the last fully successful run.
    pub last_successful_sync: Option<i64>,
    pub in_progress: bool,
    pub last_outcome: SyncOutcome,
    pub last_attempt_at: Option<i64>,
}

impl SyncState {
    pub fn has_synced(&self) -> bool {
        self.last_successful_sync.is_some()
    }

    pub fn to_persisted(&self) -> PersistedSyncState {
        let last_outcome = match &self.last_outcome {
            SyncOutcome::Unknown => None,
            outcome => serde_json::to_string(outcome).ok(),
        };
        PersistedSyncState {
            last_successful_sync: self.last_successful_sync,
            last_attempt_at: self.last_attempt_at,
            last_outcome,
        }
    }

    /// `in_progress` is never restored; a run cannot survive a restart.
    pub fn from_persisted(persisted: &PersistedSyncState) -> Self {
        let last_outcome = persisted
            .last_outcome
            .as_deref()
            .map(|json| {
                serde_json::from_str(json).unwrap_or_else(|e| {
                    warn!(error = %e, "Discarding unreadable persisted sync outcome");
                    SyncOutcome::Unknown
                })
            })
            .unwrap_or_default();

        Self {
            last_successful_sync: persisted.last_successful_sync,
            in_progress: false,
            last_outcome,
            last_attempt_at: persisted.last_attempt_at,
        }
    }
}

/// What one run did. Every caller joined to the same run receives a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub trigger: SyncTrigger,
    pub outcome: SyncOutcome,
    pub songs_written: u64,
    pub setlist_items_written: u64,
    pub gigs_written: u64,
    pub started_at: i64,
    pub finished_at: i64,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).max(0) as u64
    }
}
