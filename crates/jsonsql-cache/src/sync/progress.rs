//! Per-table operation state and progress.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::{Checkpoint, SyncStrategy};

/// Lifecycle of a table sync.
///
/// `Pending -> Running -> {Paused <-> Running} -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl SyncState {
    /// Returns the persisted spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Paused | Self::Completed | Self::Failed)
                | (Self::Paused, Self::Running | Self::Failed)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync state '{other}'")),
        }
    }
}

/// Progress of one table sync.
///
/// Updated after every committed chunk and handed to progress callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub table_name: String,
    pub strategy: SyncStrategy,
    pub state: SyncState,
    /// Rows written (inserted or updated) by this operation.
    pub dumped_rows: u64,
    /// Rows in the local table after the last committed chunk.
    pub stored_rows: u64,
    /// Remote rows rejected by projection or constraints.
    pub skipped_rows: u64,
    /// Remote row count estimate, if known.
    pub total_rows: Option<u64>,
    pub chunks: u64,
    /// Cursor of the last committed chunk.
    pub checkpoint: Option<Checkpoint>,
    /// True if this operation continued from a persisted checkpoint.
    pub resumed: bool,
    pub paused: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last error, set when the operation failed.
    pub error: Option<String>,
}

impl SyncProgress {
    /// Creates progress for a pending operation.
    #[must_use]
    pub fn new(table_name: impl Into<String>, strategy: SyncStrategy) -> Self {
        Self {
            table_name: table_name.into(),
            strategy,
            state: SyncState::Pending,
            dumped_rows: 0,
            stored_rows: 0,
            skipped_rows: 0,
            total_rows: None,
            chunks: 0,
            checkpoint: None,
            resumed: false,
            paused: false,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Offset cursor, for the `Offset` strategy.
    #[must_use]
    pub fn current_offset(&self) -> Option<u64> {
        match self.checkpoint {
            Some(Checkpoint::Offset { offset }) => Some(offset),
            _ => None,
        }
    }

    /// Identity cursor, for the `IdRange` strategy.
    #[must_use]
    pub fn current_id(&self) -> Option<i64> {
        match self.checkpoint {
            Some(Checkpoint::IdRange { last_id }) => Some(last_id),
            _ => None,
        }
    }

    /// Seconds between start and `now`, or finish if already finished.
    #[must_use]
    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> f64 {
        let end = self.finished_at.unwrap_or(now);
        let millis = (end - self.started_at).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    /// Throughput as of `now`. `None` until rows were written.
    #[must_use]
    pub fn rows_per_second_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let elapsed = self.elapsed_seconds_at(now);
        if self.dumped_rows == 0 || elapsed <= 0.0 {
            return None;
        }
        Some(self.dumped_rows as f64 / elapsed)
    }

    /// Remaining seconds as of `now`, `(total_rows - dumped_rows) /
    /// rows_per_second`. `None` without a row estimate or throughput.
    ///
    /// `dumped_rows` counts this run only, so the estimate for a resumed run
    /// also includes rows persisted before the restart.
    #[must_use]
    pub fn eta_seconds_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let total = self.total_rows?;
        let rate = self.rows_per_second_at(now)?;
        let remaining = total.saturating_sub(self.dumped_rows);
        Some(remaining as f64 / rate)
    }

    /// Throughput right now.
    #[must_use]
    pub fn rows_per_second(&self) -> Option<f64> {
        self.rows_per_second_at(Utc::now())
    }

    /// Remaining seconds right now.
    #[must_use]
    pub fn eta_seconds(&self) -> Option<f64> {
        self.eta_seconds_at(Utc::now())
    }

    /// Percentage of `total_rows` stored locally.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self.total_rows {
            Some(0) => Some(100.0),
            Some(total) => Some((self.stored_rows as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }

    /// Moves to `next` if the transition is legal. Returns false otherwise.
    pub fn transition(&mut self, next: SyncState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.paused = next == SyncState::Paused;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    /// Marks the operation failed with `error`.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.transition(SyncState::Failed) {
            self.error = Some(error.into());
        }
    }
}
