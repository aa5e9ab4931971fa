//! State machine for one test-then-implement subtask cycle.
//!
//! ```text
//! pending -> red_verified | red_not_verified | complete(skipped)   (or failed)
//!         -> green_verified | green_not_verified | complete(skipped) (or failed)
//!         -> complete | failed
//! ```
//!
//! Only worker timeouts and errors are hard failures. Unconfirmed or skipped
//! verification is recorded as a soft signal and the cycle continues.

use chrono::{DateTime, Utc};

use crate::core::types::{
    PhaseRecord, PhaseStatus, Signal, SignalKind, StageStatus, SubtaskStatus, WorkerResult,
    WorkerStatus, subtask_phase,
};
use crate::core::verification::{Expectation, VerificationReport};

/// Status a worker result is upgraded to after verification.
pub fn verified_status(expectation: Expectation, report: &VerificationReport) -> WorkerStatus {
    match (expectation, report.verified, report.skipped) {
        (Expectation::Red, true, _) => WorkerStatus::RedVerified,
        (Expectation::Green, true, _) => WorkerStatus::GreenVerified,
        (_, false, true) => WorkerStatus::Complete,
        (Expectation::Red, false, false) => WorkerStatus::RedNotVerified,
        (Expectation::Green, false, false) => WorkerStatus::GreenNotVerified,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Pending,
    TestsAuthored,
    Settled,
}

/// Final outcome of a cycle, with the record to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleVerdict {
    pub index: u32,
    pub title: String,
    pub status: SubtaskStatus,
    pub reason: Option<String>,
    pub record: PhaseRecord,
}

/// Accumulates the sub-statuses of one subtask cycle.
#[derive(Debug, Clone)]
pub struct SubtaskCycle {
    index: u32,
    title: String,
    phase: CyclePhase,
    tdd_status: Option<WorkerStatus>,
    executor_status: Option<WorkerStatus>,
    tdd_artifacts: Vec<String>,
    executor_artifacts: Vec<String>,
    red: Option<VerificationReport>,
    green: Option<VerificationReport>,
    signals: Vec<Signal>,
    terminal: Option<(SubtaskStatus, Option<String>)>,
}

impl SubtaskCycle {
    pub fn new(index: u32, title: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            phase: CyclePhase::Pending,
            tdd_status: None,
            executor_status: None,
            tdd_artifacts: Vec::new(),
            executor_artifacts: Vec::new(),
            red: None,
            green: None,
            signals: Vec::new(),
            terminal: None,
        }
    }

    /// Soft signals raised outside the state machine (e.g. artifact truncation).
    pub fn note(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    /// Record the test-authoring step. `red` is `None` when the worker failed
    /// and verification was not attempted.
    ///
    /// Returns the resulting test-author status.
    pub fn record_tests(
        &mut self,
        result: &WorkerResult,
        red: Option<VerificationReport>,
    ) -> WorkerStatus {
        debug_assert_eq!(self.phase, CyclePhase::Pending);
        self.tdd_artifacts = result.artifact_names();

        if let Some(signal) = Signal::from_worker(result, "test authoring") {
            self.tdd_status = Some(result.status);
            self.signals.push(signal);
            self.settle(SubtaskStatus::Failed, Some(result.failure_reason()));
            return result.status;
        }

        let status = match &red {
            Some(report) => {
                self.push_verification_signal(Expectation::Red, report);
                verified_status(Expectation::Red, report)
            }
            None => result.status,
        };
        self.tdd_status = Some(status);
        self.red = red;
        self.phase = CyclePhase::TestsAuthored;
        status
    }

    /// Record the implementation step and settle the cycle.
    pub fn record_implementation(
        &mut self,
        result: &WorkerResult,
        green: Option<VerificationReport>,
    ) -> WorkerStatus {
        debug_assert_eq!(self.phase, CyclePhase::TestsAuthored);
        self.executor_artifacts = result.artifact_names();

        if let Some(signal) = Signal::from_worker(result, "implementation") {
            self.executor_status = Some(result.status);
            self.signals.push(signal);
            self.settle(SubtaskStatus::Failed, Some(result.failure_reason()));
            return result.status;
        }

        let status = match &green {
            Some(report) => {
                self.push_verification_signal(Expectation::Green, report);
                verified_status(Expectation::Green, report)
            }
            None => result.status,
        };
        self.executor_status = Some(status);
        self.green = green;
        self.settle(SubtaskStatus::Complete, None);
        status
    }

    /// True once the cycle has a terminal status.
    pub fn is_settled(&self) -> bool {
        self.phase == CyclePhase::Settled
    }

    /// Consume the cycle into its verdict and `subtask-<n>` record.
    ///
    /// A cycle abandoned before settling is reported as failed.
    pub fn finish(mut self, completed_at: DateTime<Utc>) -> CycleVerdict {
        if self.terminal.is_none() {
            self.settle(
                SubtaskStatus::Failed,
                Some("cycle ended before implementation".to_string()),
            );
        }
        let (status, reason) = self
            .terminal
            .clone()
            .unwrap_or((SubtaskStatus::Failed, None));

        let phase_status = match status {
            SubtaskStatus::Complete => PhaseStatus::Complete,
            SubtaskStatus::Failed => PhaseStatus::Failed,
        };
        let executor_status = match self.executor_status {
            Some(s) => StageStatus::from(s),
            None => StageStatus::Skipped,
        };

        let mut record = PhaseRecord::new(subtask_phase(self.index), phase_status, completed_at)
            .with_signals(self.signals);
        record.title = Some(self.title.clone());
        record.reason = reason.clone();
        record.tdd_status = self.tdd_status.map(StageStatus::from);
        record.executor_status = Some(executor_status);
        record.tdd_artifacts = self.tdd_artifacts;
        record.executor_artifacts = self.executor_artifacts;
        record.red_verification = self.red;
        record.green_verification = self.green;

        CycleVerdict {
            index: self.index,
            title: self.title,
            status,
            reason,
            record,
        }
    }

    fn settle(&mut self, status: SubtaskStatus, reason: Option<String>) {
        if status == SubtaskStatus::Failed {
            let message = reason.clone().unwrap_or_else(|| "failed".to_string());
            self.signals
                .push(Signal::new(SignalKind::SubtaskFailed, message));
        }
        self.terminal = Some((status, reason));
        self.phase = CyclePhase::Settled;
    }

    fn push_verification_signal(&mut self, expectation: Expectation, report: &VerificationReport) {
        let label = expectation.as_str().to_uppercase();
        if report.skipped {
            self.signals.push(Signal::new(
                SignalKind::VerificationSkipped,
                format!("{label} verification skipped: {}", report.reason),
            ));
        } else if !report.verified {
            self.signals.push(Signal::new(
                SignalKind::VerificationUnconfirmed,
                format!("{label} not verified: {}", report.reason),
            ));
        }
    }
}
