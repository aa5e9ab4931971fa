//! Phase orchestrator: analysis, planning, subtask cycles, integration, smoke.
//!
//! `task.json` is rewritten after every transition so an interrupted or
//! aborted run resumes where it stopped. Completed phases are skipped and
//! their artifacts re-read from disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::agents::{AgentSettings, RoleOutcome};
use crate::agents::architect::{ANALYSIS_ARTIFACT, ArchitectAgent};
use crate::agents::planner::{PlannerAgent, planned_subtasks, read_planned_subtasks};
use crate::core::gates::{Gate, GateOutcome, judge_gate};
use crate::core::metadata::TaskMetadata;
use crate::core::subtasks::PlannedSubtasks;
use crate::core::threshold::FailureGate;
use crate::core::types::{
    ARCHITECT_PHASE, FailedSubtask, INTEGRATION_PHASE, PLANNER_PHASE, PhaseRecord, PhaseStatus,
    SMOKE_TEST_PHASE, Signal, SignalKind, SubtaskStatus, TaskStatus, TaskType, WorkerStatus,
};
use crate::cycle::SubtaskRunner;
use crate::io::artifacts::read_artifact;
use crate::io::config::PipelineConfig;
use crate::io::gates::{run_integration, run_smoke};
use crate::io::process::CommandRunner;
use crate::io::task_store::{TaskPaths, TaskStore};
use crate::io::worker::Worker;

/// How far a run may go before pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseSelection {
    /// Stop after the analysis phase.
    Architect,
    /// Stop after planning.
    Planner,
    #[default]
    All,
}

/// Inputs of one orchestrator run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub project_root: PathBuf,
    pub task_dir: PathBuf,
    /// Raw task text, written to `issue.md` on every run.
    pub issue: String,
    /// Used only when the task directory has no metadata yet.
    pub task_type: TaskType,
    pub phase: PhaseSelection,
    /// Overrides the stored failure limit when set.
    pub max_failures: Option<u32>,
}

/// Why the orchestrator returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineStop {
    Complete,
    /// The requested phase selection was reached.
    Paused { after: String },
    /// Analysis or planning failed.
    PhaseFailed {
        phase: String,
        cause: SignalKind,
        reason: String,
    },
    ThresholdExceeded { failure_count: u32, max_failures: u32 },
    IntegrationFailed { reason: String },
    SmokeFailed { reason: String },
}

impl PipelineStop {
    pub fn is_failure(&self) -> bool {
        !matches!(self, PipelineStop::Complete | PipelineStop::Paused { .. })
    }

    /// Hard signal matching a failure stop.
    pub fn signal(&self) -> Option<Signal> {
        let (kind, message) = match self {
            PipelineStop::Complete | PipelineStop::Paused { .. } => return None,
            PipelineStop::PhaseFailed {
                phase,
                cause,
                reason,
            } => (*cause, format!("{phase}: {reason}")),
            PipelineStop::ThresholdExceeded {
                failure_count,
                max_failures,
            } => (
                SignalKind::ThresholdExceeded,
                format!("{failure_count} subtasks failed (max {max_failures})"),
            ),
            PipelineStop::IntegrationFailed { reason } => {
                (SignalKind::IntegrationFailed, reason.clone())
            }
            PipelineStop::SmokeFailed { reason } => (SignalKind::SmokeFailed, reason.clone()),
        };
        Some(Signal::new(kind, message))
    }
}

/// What the caller gets back from a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub task_dir: PathBuf,
    pub status: TaskStatus,
    pub stop: PipelineStop,
    pub subtasks_completed: usize,
    pub subtasks_failed: usize,
    pub failed_subtasks: Vec<FailedSubtask>,
}

impl PipelineSummary {
    pub fn from_metadata(task_dir: &Path, meta: &TaskMetadata, stop: PipelineStop) -> Self {
        Self {
            task_dir: task_dir.to_path_buf(),
            status: meta.status,
            stop,
            subtasks_completed: meta.count_subtasks(SubtaskStatus::Complete),
            subtasks_failed: meta.count_subtasks(SubtaskStatus::Failed),
            failed_subtasks: meta.failed_subtasks.clone(),
        }
    }
}

/// Drive a task directory as far as `request.phase` allows.
///
/// Hard aborts are returned as `Ok` with a failure [`PipelineStop`]; `Err` means
/// the task directory or configuration could not be used.
#[instrument(skip_all, fields(task_dir = %request.task_dir.display()))]
pub fn run_pipeline<W, R>(
    request: &PipelineRequest,
    config: &PipelineConfig,
    worker: &W,
    runner: &R,
) -> Result<PipelineSummary>
where
    W: Worker + ?Sized,
    R: CommandRunner + ?Sized,
{
    let store = TaskStore::new(&request.task_dir);
    store.write_issue(&request.issue)?;

    let max_failures = request.max_failures.unwrap_or(config.max_failures);
    let mut meta = store.load_or_create(request.task_type, max_failures, Utc::now())?;
    if let Some(limit) = request.max_failures
        && limit != meta.max_failures
    {
        info!(from = meta.max_failures, to = limit, "updating failure limit");
        meta.max_failures = limit;
        store.save(&meta)?;
    }

    let mut run = PipelineRun {
        request,
        config,
        settings: AgentSettings::from_config(&request.project_root, config),
        store,
        meta,
    };
    let stop = if run.meta.status == TaskStatus::Complete {
        info!("task already complete");
        PipelineStop::Complete
    } else {
        run.drive(worker, runner)?
    };

    match &stop {
        stop if stop.is_failure() => {
            warn!(status = %run.meta.status, stop = ?stop, "pipeline stopped")
        }
        stop => info!(status = %run.meta.status, stop = ?stop, "pipeline finished"),
    }
    Ok(PipelineSummary::from_metadata(
        &request.task_dir,
        &run.meta,
        stop,
    ))
}

struct PipelineRun<'a> {
    request: &'a PipelineRequest,
    config: &'a PipelineConfig,
    settings: AgentSettings,
    store: TaskStore,
    meta: TaskMetadata,
}

impl PipelineRun<'_> {
    fn paths(&self) -> &TaskPaths {
        self.store.paths()
    }

    fn task_type(&self) -> TaskType {
        self.meta.task_type
    }

    /// Append a record, set the status, and persist.
    fn commit(&mut self, record: PhaseRecord, status: TaskStatus) -> Result<()> {
        self.meta.status = status;
        self.append(record)
    }

    /// Append a record and persist without touching the status.
    fn append(&mut self, record: PhaseRecord) -> Result<()> {
        for signal in &record.signals {
            if signal.kind.is_hard() {
                warn!(phase = %record.phase, kind = ?signal.kind, "{}", signal.message);
            } else {
                debug!(phase = %record.phase, kind = ?signal.kind, "{}", signal.message);
            }
        }
        self.meta.append(record);
        self.store.save(&self.meta)
    }

    /// Record a hard worker failure of analysis or planning.
    fn worker_failed(
        &mut self,
        phase: &str,
        outcome: &RoleOutcome,
        status: TaskStatus,
    ) -> Result<PipelineStop> {
        let reason = outcome.result.failure_reason();
        let signal = Signal::from_worker(&outcome.result, phase);
        let cause = signal.as_ref().map_or(SignalKind::WorkerError, |s| s.kind);
        let record = PhaseRecord::new(phase, PhaseStatus::from(outcome.status()), Utc::now())
            .with_reason(reason.clone())
            .with_signals(signal.into_iter().collect());
        self.commit(record, status)?;
        Ok(PipelineStop::PhaseFailed {
            phase: phase.to_string(),
            cause,
            reason,
        })
    }

    fn drive<W, R>(&mut self, worker: &W, runner: &R) -> Result<PipelineStop>
    where
        W: Worker + ?Sized,
        R: CommandRunner + ?Sized,
    {
        let analysis = match self.analysis(worker)? {
            Ok(analysis) => analysis,
            Err(stop) => return Ok(stop),
        };
        if self.request.phase == PhaseSelection::Architect {
            return Ok(PipelineStop::Paused {
                after: ARCHITECT_PHASE.to_string(),
            });
        }

        let planned = match self.planning(worker, &analysis)? {
            Ok(planned) => planned,
            Err(stop) => return Ok(stop),
        };
        if self.request.phase == PhaseSelection::Planner {
            return Ok(PipelineStop::Paused {
                after: PLANNER_PHASE.to_string(),
            });
        }

        if let Some(stop) = self.subtask_loop(worker, runner, &planned)? {
            return Ok(stop);
        }
        if let Some(stop) = self.integration(runner)? {
            return Ok(stop);
        }
        if let Some(stop) = self.smoke(runner)? {
            return Ok(stop);
        }

        self.meta.status = TaskStatus::Complete;
        self.store.save(&self.meta)?;
        Ok(PipelineStop::Complete)
    }

    /// Analysis text, from disk when the phase already ran.
    fn analysis<W: Worker + ?Sized>(
        &mut self,
        worker: &W,
    ) -> Result<Result<String, PipelineStop>> {
        let dir = self.paths().architect_dir();
        if self.meta.phase_done(ARCHITECT_PHASE) {
            match read_artifact(&dir, ANALYSIS_ARTIFACT)? {
                Some(analysis) => {
                    info!("analysis already done, reusing {ANALYSIS_ARTIFACT}");
                    return Ok(Ok(analysis));
                }
                None => warn!("{ANALYSIS_ARTIFACT} missing, re-running analysis"),
            }
        }

        let issue = self.request.issue.clone();
        let outcome = ArchitectAgent::new(&self.settings, &self.config.workers.architect)
            .run(worker, &issue, &dir)?;
        if outcome.status() != WorkerStatus::Complete {
            let stop = self.worker_failed(ARCHITECT_PHASE, &outcome, TaskStatus::ArchitectFailed)?;
            return Ok(Err(stop));
        }

        let analysis = outcome
            .result
            .artifact(ANALYSIS_ARTIFACT)
            .map_or_else(|| outcome.result.output.clone(), str::to_string);
        let record = PhaseRecord::new(ARCHITECT_PHASE, PhaseStatus::Complete, Utc::now())
            .with_artifacts(outcome.saved)
            .with_signals(outcome.signals);
        self.commit(record, TaskStatus::ArchitectComplete)?;
        Ok(Ok(analysis))
    }

    /// Subtask list, from disk when the phase already ran.
    fn planning<W: Worker + ?Sized>(
        &mut self,
        worker: &W,
        analysis: &str,
    ) -> Result<Result<PlannedSubtasks, PipelineStop>> {
        let dir = self.paths().planner_dir();
        if self.meta.phase_done(PLANNER_PHASE) {
            let planned = read_planned_subtasks(&dir)?;
            if planned.subtasks.is_empty() {
                bail!(
                    "planner is recorded as done but {} has no subtasks",
                    dir.display()
                );
            }
            info!(subtasks = planned.subtasks.len(), "planning already done, reusing plan");
            return Ok(Ok(planned));
        }

        let outcome = PlannerAgent::new(&self.settings, &self.config.workers.planner)
            .run(worker, analysis, &dir)?;
        if outcome.status() != WorkerStatus::Complete {
            let stop = self.worker_failed(PLANNER_PHASE, &outcome, TaskStatus::PlannerFailed)?;
            return Ok(Err(stop));
        }

        let planned = planned_subtasks(&outcome.result);
        let mut signals = outcome.signals;
        signals.extend(planned.fallback.clone());
        if planned.subtasks.is_empty() {
            let reason = "planning produced no subtasks".to_string();
            signals.push(Signal::new(SignalKind::PlanningEmpty, reason.clone()));
            let record = PhaseRecord::new(PLANNER_PHASE, PhaseStatus::Failed, Utc::now())
                .with_artifacts(outcome.saved)
                .with_reason(reason.clone())
                .with_signals(signals);
            self.commit(record, TaskStatus::PlannerFailed)?;
            return Ok(Err(PipelineStop::PhaseFailed {
                phase: PLANNER_PHASE.to_string(),
                cause: SignalKind::PlanningEmpty,
                reason,
            }));
        }

        info!(subtasks = planned.subtasks.len(), "planning complete");
        let record = PhaseRecord::new(PLANNER_PHASE, PhaseStatus::Complete, Utc::now())
            .with_artifacts(outcome.saved)
            .with_signals(signals);
        self.commit(record, TaskStatus::PlannerComplete)?;
        Ok(Ok(planned))
    }

    /// Run unsettled subtasks in plan order until done or the threshold trips.
    ///
    /// An already tripped threshold stops the run here even when every subtask
    /// is settled, so the gates never run past it.
    fn subtask_loop<W, R>(
        &mut self,
        worker: &W,
        runner: &R,
        planned: &PlannedSubtasks,
    ) -> Result<Option<PipelineStop>>
    where
        W: Worker + ?Sized,
        R: CommandRunner + ?Sized,
    {
        let gate = FailureGate::new(self.meta.max_failures);
        let settled = self.meta.settled_subtasks();
        let settings = self.settings.clone();
        let cycles = SubtaskRunner::new(&settings, self.config, self.task_type());
        let total = planned.subtasks.len();
        if gate.is_tripped(self.meta.failure_count) {
            return self.threshold_stop(gate).map(Some);
        }

        for (position, subtask) in (1u32..).zip(&planned.subtasks) {
            if settled.contains(&position) {
                debug!(subtask = position, "subtask already settled, skipping");
                continue;
            }
            if self.meta.status != TaskStatus::SubtasksInProgress {
                self.meta.status = TaskStatus::SubtasksInProgress;
                self.store.save(&self.meta)?;
            }

            info!(subtask = position, total, title = %subtask.title, "starting subtask");
            let verdict = cycles.run(worker, runner, position, subtask, self.paths())?;
            if verdict.status == SubtaskStatus::Failed {
                let reason = verdict.reason.as_deref().unwrap_or("failed");
                self.meta
                    .record_subtask_failure(verdict.index, &verdict.title, reason);
            }
            self.append(verdict.record)?;

            if gate.is_tripped(self.meta.failure_count) {
                return self.threshold_stop(gate).map(Some);
            }
        }
        Ok(None)
    }

    fn threshold_stop(&mut self, gate: FailureGate) -> Result<PipelineStop> {
        warn!(
            failure_count = self.meta.failure_count,
            max_failures = gate.max_failures(),
            "failure threshold reached, stopping"
        );
        self.meta.status = TaskStatus::FailedThreshold;
        self.store.save(&self.meta)?;
        Ok(PipelineStop::ThresholdExceeded {
            failure_count: self.meta.failure_count,
            max_failures: gate.max_failures(),
        })
    }

    fn integration<R: CommandRunner + ?Sized>(
        &mut self,
        runner: &R,
    ) -> Result<Option<PipelineStop>> {
        if self.meta.phase_done(INTEGRATION_PHASE) {
            info!("integration already passed");
            return Ok(None);
        }
        let output = self.paths().integration_output();
        let outcome = run_integration(
            runner,
            self.config.integration.get(self.task_type()),
            &self.request.project_root,
            Duration::from_secs(self.config.integration_timeout_secs),
            self.config.output_limit_bytes,
            &output,
        )?;
        self.gate(
            Gate::Integration,
            INTEGRATION_PHASE,
            &outcome,
            &output,
            TaskStatus::IntegrationFailed,
        )
        .map(|failed| failed.map(|reason| PipelineStop::IntegrationFailed { reason }))
    }

    fn smoke<R: CommandRunner + ?Sized>(&mut self, runner: &R) -> Result<Option<PipelineStop>> {
        if self.meta.phase_done(SMOKE_TEST_PHASE) {
            info!("smoke test already passed");
            return Ok(None);
        }
        let outcome = run_smoke(
            runner,
            self.paths(),
            &self.config.smoke,
            &self.request.project_root,
            Duration::from_secs(self.config.smoke_timeout_secs),
            self.config.output_limit_bytes,
        )?;
        let output = self.paths().smoke_output();
        self.gate(
            Gate::Smoke,
            SMOKE_TEST_PHASE,
            &outcome,
            &output,
            TaskStatus::SmokeTestFailed,
        )
        .map(|failed| failed.map(|reason| PipelineStop::SmokeFailed { reason }))
    }

    /// Record a gate run. Returns the failure reason when the gate blocks.
    fn gate(
        &mut self,
        gate: Gate,
        phase: &str,
        outcome: &GateOutcome,
        output: &Path,
        failed_status: TaskStatus,
    ) -> Result<Option<String>> {
        let verdict = judge_gate(gate, outcome);
        let artifacts = output
            .file_name()
            .map(|name| vec![name.to_string_lossy().into_owned()])
            .unwrap_or_default();
        let mut record = PhaseRecord::new(phase, verdict.status, Utc::now())
            .with_artifacts(artifacts)
            .with_exit_code(verdict.exit_code)
            .with_signals(verdict.signal.clone().into_iter().collect());
        record.reason = verdict.reason.clone();

        if verdict.is_blocking() {
            let reason = verdict
                .reason
                .unwrap_or_else(|| format!("{} failed", gate.as_str()));
            warn!(gate = gate.as_str(), reason = %reason, "gate failed");
            self.commit(record, failed_status)?;
            return Ok(Some(reason));
        }
        info!(gate = gate.as_str(), status = %verdict.status, "gate passed");
        self.commit(record, TaskStatus::ValidationInProgress)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::agents::planner::{PLAN_ARTIFACT, SUBTASKS_ARTIFACT};
    use crate::io::process::CommandOutcome;
    use crate::test_support::{
        ScriptedRunner, ScriptedWorker, TestProject, worker_crash, worker_output,
        worker_timeout,
    };

    fn request(project: &TestProject, phase: PhaseSelection) -> PipelineRequest {
        PipelineRequest {
            project_root: project.root().to_path_buf(),
            task_dir: project.task_dir(),
            issue: "title:\tAdd health check\n".to_string(),
            task_type: TaskType::Infrastructure,
            phase,
            max_failures: None,
        }
    }

    #[test]
    fn architect_failure_aborts_with_phase() {
        let project = TestProject::new().expect("project");
        let worker = ScriptedWorker::new(vec![worker_crash("no credits")]);
        let runner = ScriptedRunner::new(Vec::new());

        let summary = run_pipeline(
            &request(&project, PhaseSelection::All),
            &PipelineConfig::default(),
            &worker,
            &runner,
        )
        .expect("run");

        assert_eq!(summary.status, TaskStatus::ArchitectFailed);
        assert_eq!(
            summary.stop,
            PipelineStop::PhaseFailed {
                phase: "architect".to_string(),
                cause: SignalKind::WorkerError,
                reason: "error: no credits".to_string(),
            }
        );
        assert!(project.task_dir().join("issue.md").is_file());
        worker.assert_drained();
    }

    #[test]
    fn phase_selection_pauses_after_architect() {
        let project = TestProject::new().expect("project");
        let worker = ScriptedWorker::new(vec![worker_output(&[("analysis.md", "# Analysis")])]);
        let runner = ScriptedRunner::new(Vec::new());

        let summary = run_pipeline(
            &request(&project, PhaseSelection::Architect),
            &PipelineConfig::default(),
            &worker,
            &runner,
        )
        .expect("run");

        assert_eq!(summary.status, TaskStatus::ArchitectComplete);
        assert_eq!(
            summary.stop,
            PipelineStop::Paused {
                after: "architect".to_string()
            }
        );
        assert!(project.task_dir().join("01-architect/analysis.md").is_file());
    }

    /// Verifies an empty structured list aborts planning with its own cause.
    #[test]
    fn empty_subtask_list_aborts_planner() {
        let project = TestProject::new().expect("project");
        let worker = ScriptedWorker::new(vec![
            worker_output(&[("analysis.md", "# Analysis")]),
            worker_output(&[(PLAN_ARTIFACT, "# Plan"), (SUBTASKS_ARTIFACT, "[]")]),
        ]);
        let runner = ScriptedRunner::new(Vec::new());

        let summary = run_pipeline(
            &request(&project, PhaseSelection::All),
            &PipelineConfig::default(),
            &worker,
            &runner,
        )
        .expect("run");

        assert_eq!(summary.status, TaskStatus::PlannerFailed);
        assert!(matches!(
            summary.stop,
            PipelineStop::PhaseFailed { ref phase, .. } if phase == "planner"
        ));
        let signal = summary.stop.signal().expect("failure signal");
        assert_eq!(signal.kind, SignalKind::PlanningEmpty);
        assert!(signal.kind.is_hard());
        assert_eq!(signal.message, "planner: planning produced no subtasks");
    }

    #[test]
    fn worker_timeout_is_the_phase_failure_cause() {
        let project = TestProject::new().expect("project");
        let worker = ScriptedWorker::new(vec![worker_timeout()]);
        let runner = ScriptedRunner::new(Vec::new());

        let summary = run_pipeline(
            &request(&project, PhaseSelection::All),
            &PipelineConfig::default(),
            &worker,
            &runner,
        )
        .expect("run");

        assert!(matches!(
            summary.stop,
            PipelineStop::PhaseFailed {
                cause: SignalKind::WorkerTimeout,
                ..
            }
        ));
    }

    #[test]
    fn completed_task_invokes_nothing() {
        let project = TestProject::new().expect("project");
        let store = TaskStore::new(project.task_dir());
        let mut meta = TaskMetadata::new(TaskType::App, 3, Utc::now());
        meta.status = TaskStatus::Complete;
        store.save(&meta).expect("save");
        let worker = ScriptedWorker::new(Vec::new());
        let runner = ScriptedRunner::new(Vec::new());

        let summary = run_pipeline(
            &request(&project, PhaseSelection::All),
            &PipelineConfig::default(),
            &worker,
            &runner,
        )
        .expect("run");
        assert_eq!(summary.stop, PipelineStop::Complete);
    }

    /// Verifies a missing integration runner is a soft pass and an absent smoke
    /// script is recorded as skipped.
    #[test]
    fn soft_gates_complete_the_task() {
        let project = TestProject::new().expect("project");
        let worker = ScriptedWorker::new(vec![
            worker_output(&[("analysis.md", "# Analysis")]),
            worker_output(&[(PLAN_ARTIFACT, "# Plan\n- one step")]),
            worker_output(&[("test-spec.md", "- spec")]),
            worker_output(&[("implementation-notes.md", "done")]),
        ]);
        let runner = ScriptedRunner::new(vec![CommandOutcome::NotFound {
            program: "just".to_string(),
        }]);

        let summary = run_pipeline(
            &request(&project, PhaseSelection::All),
            &PipelineConfig::default(),
            &worker,
            &runner,
        )
        .expect("run");

        assert_eq!(summary.stop, PipelineStop::Complete);
        assert_eq!(summary.subtasks_completed, 1);
        let meta = TaskStore::new(project.task_dir())
            .load()
            .expect("load")
            .expect("metadata");
        let phases: Vec<_> = meta.phases_completed.iter().map(|r| r.phase.as_str()).collect();
        assert_eq!(
            phases,
            vec!["architect", "planner", "subtask-1", "integration", "smoke_test"]
        );
        assert_eq!(
            meta.last_record(PLANNER_PHASE).expect("planner").signals[0].kind,
            SignalKind::ParseFallback
        );
        assert_eq!(
            meta.last_record(INTEGRATION_PHASE).expect("integration").status,
            PhaseStatus::RunnerNotFound
        );
        assert_eq!(
            meta.last_record(SMOKE_TEST_PHASE).expect("smoke").status,
            PhaseStatus::Skipped
        );
        let smoke = fs::read_to_string(project.task_dir().join("05-smoke-test/smoke-output.txt"))
            .expect("smoke output");
        assert!(smoke.contains("skipped"));
        worker.assert_drained();
        runner.assert_drained();
    }

    /// Verifies a passing gate moves the status off a previous gate failure
    /// before the next gate runs.
    #[test]
    fn passing_gate_clears_previous_gate_failure() {
        let project = TestProject::new().expect("project");
        let config = PipelineConfig::default();
        let request = request(&project, PhaseSelection::All);
        let store = TaskStore::new(project.task_dir());
        let mut meta = TaskMetadata::new(TaskType::Infrastructure, 3, Utc::now());
        meta.status = TaskStatus::IntegrationFailed;
        store.save(&meta).expect("save");
        let mut run = PipelineRun {
            request: &request,
            config: &config,
            settings: AgentSettings::from_config(project.root(), &config),
            store,
            meta,
        };
        let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "ok")]);

        let stop = run.integration(&runner).expect("integration");

        assert_eq!(stop, None);
        let saved = TaskStore::new(project.task_dir())
            .load()
            .expect("load")
            .expect("metadata");
        assert_eq!(saved.status, TaskStatus::ValidationInProgress);
        assert!(saved.phase_done(INTEGRATION_PHASE));
    }
}
