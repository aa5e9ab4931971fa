//! Classification of integration and smoke gate runs.

use crate::core::types::{PhaseStatus, Signal, SignalKind};

/// Which post-loop gate produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Integration,
    Smoke,
}

impl Gate {
    pub fn as_str(self) -> &'static str {
        match self {
            Gate::Integration => "integration",
            Gate::Smoke => "smoke test",
        }
    }

    fn failure_kind(self) -> SignalKind {
        match self {
            Gate::Integration => SignalKind::IntegrationFailed,
            Gate::Smoke => SignalKind::SmokeFailed,
        }
    }
}

/// Raw result of running a gate command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Exit code 0.
    Passed,
    /// Non-zero exit.
    Failed { exit_code: Option<i32> },
    TimedOut { timeout_secs: u64 },
    /// The runner program is not installed.
    RunnerNotFound { program: String },
    /// Nothing to run (no smoke script, no integration command).
    Absent { reason: String },
}

/// What the orchestrator records and whether it must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub status: PhaseStatus,
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
    pub signal: Option<Signal>,
}

impl GateVerdict {
    /// Hard failures stop the pipeline.
    pub fn is_blocking(&self) -> bool {
        !self.status.is_success()
    }
}

/// Map a gate outcome onto its record status.
///
/// Only a non-zero exit or a timeout blocks. A missing runner or a missing
/// script is a soft pass.
pub fn judge_gate(gate: Gate, outcome: &GateOutcome) -> GateVerdict {
    let name = gate.as_str();
    match outcome {
        GateOutcome::Passed => GateVerdict {
            status: PhaseStatus::Passed,
            exit_code: Some(0),
            reason: None,
            signal: None,
        },
        GateOutcome::Failed { exit_code } => {
            let reason = match exit_code {
                Some(code) => format!("{name} exited with code {code}"),
                None => format!("{name} terminated by signal"),
            };
            GateVerdict {
                status: PhaseStatus::Failed,
                exit_code: *exit_code,
                reason: Some(reason.clone()),
                signal: Some(Signal::new(gate.failure_kind(), reason)),
            }
        }
        GateOutcome::TimedOut { timeout_secs } => {
            let reason = format!("{name} timed out after {timeout_secs}s");
            GateVerdict {
                status: PhaseStatus::Timeout,
                exit_code: None,
                reason: Some(reason.clone()),
                signal: Some(Signal::new(gate.failure_kind(), reason)),
            }
        }
        GateOutcome::RunnerNotFound { program } => {
            let reason = format!("{name} runner not found: {program}");
            GateVerdict {
                status: PhaseStatus::RunnerNotFound,
                exit_code: None,
                reason: Some(reason.clone()),
                signal: Some(Signal::new(SignalKind::VerificationSkipped, reason)),
            }
        }
        GateOutcome::Absent { reason } => GateVerdict {
            status: PhaseStatus::Skipped,
            exit_code: None,
            reason: Some(reason.clone()),
            signal: None,
        },
    }
}
