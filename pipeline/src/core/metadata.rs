//! Task metadata: the single source of truth for resumability.
//!
//! Persistence lives in `io::task_store`; this module only defines the state
//! and the queries the orchestrator makes over it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{
    FailedSubtask, PhaseRecord, PhaseStatus, SubtaskStatus, TaskStatus, TaskType,
};

/// Persisted state of one task directory (`task.json`).
///
/// `phases_completed` is append-only. `failure_count` always equals the number
/// of `subtask-<n>` records whose status is `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub task_type: TaskType,
    #[serde(default)]
    pub max_failures: u32,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub failed_subtasks: Vec<FailedSubtask>,
    #[serde(default)]
    pub phases_completed: Vec<PhaseRecord>,
}

impl TaskMetadata {
    pub fn new(task_type: TaskType, max_failures: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            status: TaskStatus::Initialized,
            task_type,
            max_failures,
            failure_count: 0,
            failed_subtasks: Vec::new(),
            phases_completed: Vec::new(),
        }
    }

    /// Append a record. Existing records are never rewritten.
    pub fn append(&mut self, record: PhaseRecord) {
        self.phases_completed.push(record);
    }

    /// Latest record for `phase`, if any.
    pub fn last_record(&self, phase: &str) -> Option<&PhaseRecord> {
        self.phases_completed.iter().rev().find(|r| r.phase == phase)
    }

    /// True if `phase` has a successful record, so a resumed run may skip it.
    pub fn phase_done(&self, phase: &str) -> bool {
        self.phases_completed
            .iter()
            .any(|r| r.phase == phase && r.status.is_success())
    }

    /// Subtask indexes that already have a record, whatever its outcome.
    pub fn settled_subtasks(&self) -> BTreeSet<u32> {
        self.phases_completed
            .iter()
            .filter_map(PhaseRecord::subtask_index)
            .collect()
    }

    /// Count subtask records with the given terminal status.
    pub fn count_subtasks(&self, status: SubtaskStatus) -> usize {
        let wanted = match status {
            SubtaskStatus::Complete => PhaseStatus::Complete,
            SubtaskStatus::Failed => PhaseStatus::Failed,
        };
        self.phases_completed
            .iter()
            .filter(|r| r.subtask_index().is_some() && r.status == wanted)
            .count()
    }

    /// Account for one failed subtask cycle.
    pub fn record_subtask_failure(&mut self, index: u32, title: &str, reason: &str) {
        self.failure_count += 1;
        self.failed_subtasks.push(FailedSubtask {
            index,
            title: title.to_string(),
            reason: reason.to_string(),
        });
    }
}
