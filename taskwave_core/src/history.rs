//! Bounded execution history of terminal workflow runs.
//!
//! History entries are owned deep copies of the final workflow state so
//! that later mutation of a live workflow can never reach back into a
//! recorded run.

use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default maximum number of retained history entries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Terminal outcome of a recorded workflow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every step completed
    Completed,
    /// A step exhausted retries or configuration was invalid
    Failed,
    /// Explicitly cancelled by the caller
    Cancelled,
}

/// Immutable snapshot of one terminal workflow run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry identifier
    pub id: String,
    /// Full workflow state at terminal time (owned copy)
    pub workflow: Workflow,
    /// Terminal outcome
    pub outcome: Outcome,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When the terminal state was reached
    pub finished_at: DateTime<Utc>,
    /// Total run duration in milliseconds
    pub duration_ms: Option<i64>,
    /// Short human-readable summary for audit views
    pub summary: String,
}

impl HistoryEntry {
    /// Creates a history entry from a terminal workflow.
    ///
    /// The workflow is taken by value; callers clone the live state
    /// before handing it over so the entry owns an independent copy.
    pub fn new(
        workflow: Workflow,
        outcome: Outcome,
        started_at: Option<DateTime<Utc>>,
        summary: impl Into<String>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_ms = started_at.map(|s| (finished_at - s).num_milliseconds());
        Self {
            id: Uuid::new_v4().to_string(),
            workflow,
            outcome,
            started_at,
            finished_at,
            duration_ms,
            summary: summary.into(),
        }
    }
}

/// Append-only FIFO log of terminal workflow runs.
///
/// Capped at a fixed capacity; the oldest entry is evicted on overflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryLog {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    /// Creates an empty log with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates an empty log with an explicit capacity.
    ///
    /// A capacity of zero is clamped to one so appends never silently
    /// discard the entry being recorded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Appends an entry, evicting the oldest past capacity.
    pub fn append(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns entries oldest-first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no runs have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}
