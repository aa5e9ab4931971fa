//! Shared deterministic types for the pipeline core.
//!
//! These types define the stable contracts persisted in `task.json` and passed
//! between phases. They perform no I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::verification::VerificationReport;

/// Named text outputs of a single worker invocation.
///
/// Names may contain `/` to express a relative file path inside the owning
/// artifact directory.
pub type Artifacts = BTreeMap<String, String>;

/// Selects which worker variant runs the test-authoring and implementation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Application code (TypeScript tests).
    App,
    /// Shell, container, and environment work (bash tests).
    Infrastructure,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::App => "app",
            TaskType::Infrastructure => "infrastructure",
        }
    }

    /// Suffix of test files the test author is asked to produce.
    pub fn test_extension(self) -> &'static str {
        match self {
            TaskType::App => ".test.ts",
            TaskType::Infrastructure => ".test.sh",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one worker invocation.
///
/// The invocation layer only produces `Complete`, `Timeout`, and `Error`; the
/// verification statuses are assigned by the subtask cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Complete,
    Timeout,
    Error,
    RedVerified,
    RedNotVerified,
    GreenVerified,
    GreenNotVerified,
}

impl WorkerStatus {
    /// True for statuses that stop a subtask cycle.
    pub fn is_hard_failure(self) -> bool {
        matches!(self, WorkerStatus::Timeout | WorkerStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Complete => "complete",
            WorkerStatus::Timeout => "timeout",
            WorkerStatus::Error => "error",
            WorkerStatus::RedVerified => "red_verified",
            WorkerStatus::RedNotVerified => "red_not_verified",
            WorkerStatus::GreenVerified => "green_verified",
            WorkerStatus::GreenNotVerified => "green_not_verified",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one worker invocation. Never mutated by the caller after return,
/// except for the status upgrade applied by verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub status: WorkerStatus,
    pub output: String,
    pub artifacts: Artifacts,
    pub error: Option<String>,
}

impl WorkerResult {
    pub fn complete(output: String, artifacts: Artifacts) -> Self {
        Self {
            status: WorkerStatus::Complete,
            output,
            artifacts,
            error: None,
        }
    }

    pub fn timeout(output: String, error: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Timeout,
            output,
            artifacts: Artifacts::new(),
            error: Some(error.into()),
        }
    }

    pub fn error(output: String, error: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Error,
            output,
            artifacts: Artifacts::new(),
            error: Some(error.into()),
        }
    }

    pub fn artifact(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    /// Human-readable failure description for records and summaries.
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(err) if !err.trim().is_empty() => format!("{}: {}", self.status, err.trim()),
            _ => self.status.to_string(),
        }
    }
}

/// A hint pointing downstream workers at an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ReferenceFileRepr")]
pub struct ReferenceFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReferenceFileRepr {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl From<ReferenceFileRepr> for ReferenceFile {
    fn from(repr: ReferenceFileRepr) -> Self {
        match repr {
            ReferenceFileRepr::Path(path) => ReferenceFile { path, reason: None },
            ReferenceFileRepr::Detailed { path, reason } => ReferenceFile { path, reason },
        }
    }
}

/// One unit of planner-emitted work.
///
/// `depends_on` is informational: execution order is the order the planner
/// emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub number: u32,
    pub title: String,
    pub description: String,
    pub files: Vec<String>,
    pub depends_on: Vec<u32>,
    #[serde(default)]
    pub reference_files: Vec<ReferenceFile>,
}

/// Overall status of a task directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initialized,
    ArchitectComplete,
    ArchitectFailed,
    PlannerComplete,
    PlannerFailed,
    SubtasksInProgress,
    /// A validation gate passed and the next one has not run yet.
    ValidationInProgress,
    FailedThreshold,
    IntegrationFailed,
    SmokeTestFailed,
    Complete,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Initialized => "initialized",
            TaskStatus::ArchitectComplete => "architect_complete",
            TaskStatus::ArchitectFailed => "architect_failed",
            TaskStatus::PlannerComplete => "planner_complete",
            TaskStatus::PlannerFailed => "planner_failed",
            TaskStatus::SubtasksInProgress => "subtasks_in_progress",
            TaskStatus::ValidationInProgress => "validation_in_progress",
            TaskStatus::FailedThreshold => "failed_threshold",
            TaskStatus::IntegrationFailed => "integration_failed",
            TaskStatus::SmokeTestFailed => "smoke_test_failed",
            TaskStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status stored on a [`PhaseRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Complete,
    Failed,
    Passed,
    Skipped,
    Timeout,
    Error,
    RunnerNotFound,
}

impl PhaseStatus {
    /// Statuses that let a resumed run skip the phase.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            PhaseStatus::Complete
                | PhaseStatus::Passed
                | PhaseStatus::Skipped
                | PhaseStatus::RunnerNotFound
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Complete => "complete",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Passed => "passed",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::Timeout => "timeout",
            PhaseStatus::Error => "error",
            PhaseStatus::RunnerNotFound => "runner_not_found",
        }
    }
}

impl From<WorkerStatus> for PhaseStatus {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Timeout => PhaseStatus::Timeout,
            WorkerStatus::Error => PhaseStatus::Error,
            _ => PhaseStatus::Complete,
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-status of the test-authoring or implementation step inside a subtask record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Complete,
    Timeout,
    Error,
    RedVerified,
    RedNotVerified,
    GreenVerified,
    GreenNotVerified,
    Skipped,
}

impl From<WorkerStatus> for StageStatus {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Complete => StageStatus::Complete,
            WorkerStatus::Timeout => StageStatus::Timeout,
            WorkerStatus::Error => StageStatus::Error,
            WorkerStatus::RedVerified => StageStatus::RedVerified,
            WorkerStatus::RedNotVerified => StageStatus::RedNotVerified,
            WorkerStatus::GreenVerified => StageStatus::GreenVerified,
            WorkerStatus::GreenNotVerified => StageStatus::GreenNotVerified,
        }
    }
}

/// Terminal status of one subtask cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Complete,
    Failed,
}

/// Error taxonomy shared by records and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    WorkerTimeout,
    WorkerError,
    VerificationUnconfirmed,
    VerificationSkipped,
    SubtaskFailed,
    ThresholdExceeded,
    IntegrationFailed,
    SmokeFailed,
    ParseFallback,
    ArtifactTruncated,
    /// Planning finished but yielded no subtask, even after the plan fallback.
    PlanningEmpty,
}

impl SignalKind {
    /// Hard signals stop the current subtask or the whole pipeline; soft ones
    /// are recorded and execution continues.
    pub fn is_hard(self) -> bool {
        matches!(
            self,
            SignalKind::WorkerTimeout
                | SignalKind::WorkerError
                | SignalKind::SubtaskFailed
                | SignalKind::ThresholdExceeded
                | SignalKind::IntegrationFailed
                | SignalKind::SmokeFailed
                | SignalKind::PlanningEmpty
        )
    }
}

/// One classified event raised while a phase ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub message: String,
}

impl Signal {
    pub fn new(kind: SignalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Signal matching a hard worker failure, or `None` for non-failing statuses.
    pub fn from_worker(result: &WorkerResult, step: &str) -> Option<Self> {
        let kind = match result.status {
            WorkerStatus::Timeout => SignalKind::WorkerTimeout,
            WorkerStatus::Error => SignalKind::WorkerError,
            _ => return None,
        };
        Some(Signal::new(
            kind,
            format!("{step}: {}", result.failure_reason()),
        ))
    }
}

pub const ARCHITECT_PHASE: &str = "architect";
pub const PLANNER_PHASE: &str = "planner";
pub const INTEGRATION_PHASE: &str = "integration";
pub const SMOKE_TEST_PHASE: &str = "smoke_test";
const SUBTASK_PHASE_PREFIX: &str = "subtask-";

/// Record name for the subtask at 1-based `index`.
pub fn subtask_phase(index: u32) -> String {
    format!("{SUBTASK_PHASE_PREFIX}{index}")
}

/// Parse `subtask-<n>` back into `n`.
pub fn parse_subtask_phase(phase: &str) -> Option<u32> {
    phase.strip_prefix(SUBTASK_PHASE_PREFIX)?.parse().ok()
}

/// Immutable completion record appended to `phases_completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub completed_at: DateTime<Utc>,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdd_status: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_status: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tdd_artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executor_artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_verification: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green_verification: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Signal>,
}

impl PhaseRecord {
    pub fn new(phase: impl Into<String>, status: PhaseStatus, completed_at: DateTime<Utc>) -> Self {
        Self {
            phase: phase.into(),
            completed_at,
            status,
            title: None,
            artifacts: Vec::new(),
            exit_code: None,
            reason: None,
            tdd_status: None,
            executor_status: None,
            tdd_artifacts: Vec::new(),
            executor_artifacts: Vec::new(),
            red_verification: None,
            green_verification: None,
            signals: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_signals(mut self, signals: Vec<Signal>) -> Self {
        self.signals = signals;
        self
    }

    /// Subtask index if this record belongs to a subtask cycle.
    pub fn subtask_index(&self) -> Option<u32> {
        parse_subtask_phase(&self.phase)
    }
}

/// Entry of `failed_subtasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSubtask {
    pub index: u32,
    pub title: String,
    pub reason: String,
}
