//! Subtask cycle: author failing tests, verify RED, implement, verify GREEN.
//!
//! Transitions and record building live in [`crate::core::cycle_state`]; this
//! module wires the two worker roles and the verification runner into it.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::agents::AgentSettings;
use crate::agents::implementer::ImplementerAgent;
use crate::agents::test_author::{TEST_SPEC_ARTIFACT, TestAuthorAgent};
use crate::core::cycle_state::{CycleVerdict, SubtaskCycle};
use crate::core::types::{Subtask, SubtaskStatus, TaskType};
use crate::core::verification::Expectation;
use crate::io::artifacts::read_artifact;
use crate::io::config::PipelineConfig;
use crate::io::process::CommandRunner;
use crate::io::task_store::TaskPaths;
use crate::io::verify::{TESTS_DIR, VerifyRequest, run_verification};
use crate::io::worker::Worker;

/// Runs subtask cycles for one task type.
///
/// The worker variant and test command are chosen once, at construction.
pub struct SubtaskRunner<'a> {
    settings: &'a AgentSettings,
    config: &'a PipelineConfig,
    task_type: TaskType,
}

impl<'a> SubtaskRunner<'a> {
    pub fn new(
        settings: &'a AgentSettings,
        config: &'a PipelineConfig,
        task_type: TaskType,
    ) -> Self {
        Self {
            settings,
            config,
            task_type,
        }
    }

    /// Run one cycle to completion. Worker failures settle the cycle as failed;
    /// only infrastructure errors are returned as `Err`.
    ///
    /// `index` is the subtask's 1-based position in the plan and names its
    /// directories and record.
    #[instrument(skip_all, fields(subtask = index, task_type = self.task_type.as_str()))]
    pub fn run<W, R>(
        &self,
        worker: &W,
        runner: &R,
        index: u32,
        subtask: &Subtask,
        paths: &TaskPaths,
    ) -> Result<CycleVerdict>
    where
        W: Worker + ?Sized,
        R: CommandRunner + ?Sized,
    {
        let tdd_dir = paths.tdd_dir(index);
        let executor_dir = paths.executor_dir(index);
        let profile = self.config.workers.for_task_type(self.task_type);
        let mut cycle = SubtaskCycle::new(index, subtask.title.clone());

        let tests = TestAuthorAgent::new(
            self.settings,
            profile,
            self.task_type,
            self.config.test_spec_max_lines,
        )
        .run(worker, subtask, &tdd_dir)?;
        for signal in tests.signals {
            cycle.note(signal);
        }
        let red = if tests.result.status.is_hard_failure() {
            None
        } else {
            Some(run_verification(runner, &self.verify_request(&tdd_dir), Expectation::Red)?)
        };
        let tdd_status = cycle.record_tests(&tests.result, red);
        info!(status = %tdd_status, "test authoring finished");

        if !cycle.is_settled() {
            let test_spec = read_artifact(&tdd_dir, TEST_SPEC_ARTIFACT)?;
            let implementation = ImplementerAgent::new(
                self.settings,
                profile,
                self.config.notes_max_lines,
            )
            .run(
                worker,
                subtask,
                &tdd_dir.join(TESTS_DIR),
                test_spec.as_deref(),
                &executor_dir,
            )?;
            for signal in implementation.signals {
                cycle.note(signal);
            }
            let green = if implementation.result.status.is_hard_failure() {
                None
            } else {
                Some(run_verification(runner, &self.verify_request(&tdd_dir), Expectation::Green)?)
            };
            let executor_status = cycle.record_implementation(&implementation.result, green);
            info!(status = %executor_status, "implementation finished");
        }

        let verdict = cycle.finish(Utc::now());
        match verdict.status {
            SubtaskStatus::Complete => info!(title = %verdict.title, "subtask complete"),
            SubtaskStatus::Failed => warn!(
                title = %verdict.title,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                "subtask failed"
            ),
        }
        Ok(verdict)
    }

    fn verify_request(&self, tdd_dir: &Path) -> VerifyRequest {
        VerifyRequest {
            tdd_dir: tdd_dir.to_path_buf(),
            project_root: self.settings.project_root.clone(),
            command: self.config.verify.get(self.task_type).clone(),
            file_timeout: Duration::from_secs(self.config.verify_timeout_secs),
            probe_timeout: Duration::from_secs(self.config.probe_timeout_secs),
            max_files: self.config.max_test_files,
            output_limit_bytes: self.config.output_limit_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PhaseStatus, SignalKind, StageStatus};
    use crate::io::process::CommandOutcome;
    use crate::test_support::{
        ScriptedRunner, ScriptedWorker, TestProject, worker_crash, worker_output, worker_timeout,
    };

    fn subtask() -> Subtask {
        Subtask {
            number: 1,
            title: "Health check".to_string(),
            description: "Add scripts/health.sh".to_string(),
            files: vec!["scripts/health.sh".to_string()],
            depends_on: Vec::new(),
            reference_files: Vec::new(),
        }
    }

    fn tests_output() -> CommandOutcome {
        worker_output(&[
            ("tests/subtask-01.test.sh", "test -x scripts/health.sh"),
            (TEST_SPEC_ARTIFACT, "- health script exists"),
        ])
    }

    /// Verifies the happy path: RED confirmed, GREEN confirmed.
    #[test]
    fn red_then_green_completes() {
        let project = TestProject::new().expect("project");
        let config = PipelineConfig::default();
        let settings = AgentSettings::from_config(project.root(), &config);
        let paths = TaskPaths::new(project.task_dir());
        let worker = ScriptedWorker::new(vec![
            tests_output(),
            worker_output(&[("implementation-notes.md", "added script")]),
        ]);
        let runner = ScriptedRunner::new(vec![
            CommandOutcome::exited(1, "not ok"),
            CommandOutcome::exited(0, "ok"),
        ]);

        let verdict = SubtaskRunner::new(&settings, &config, TaskType::Infrastructure)
            .run(&worker, &runner, 1, &subtask(), &paths)
            .expect("cycle");

        assert_eq!(verdict.status, SubtaskStatus::Complete);
        assert_eq!(verdict.record.phase, "subtask-1");
        assert_eq!(verdict.record.tdd_status, Some(StageStatus::RedVerified));
        assert_eq!(verdict.record.executor_status, Some(StageStatus::GreenVerified));
        assert_eq!(worker.invoked(), vec!["dx-engineer", "dx-engineer"]);
        assert!(worker.requests()[1].prompt.contains("- health script exists"));

        let calls = runner.calls();
        assert_eq!(calls[0].program, "bash");
        assert_eq!(calls[0].workdir, paths.tdd_dir(1));
        assert!(calls[0].args[0].ends_with("tests/subtask-01.test.sh"));
        worker.assert_drained();
        runner.assert_drained();
    }

    /// Verifies a test-author timeout fails the subtask and skips the implementer.
    #[test]
    fn test_author_timeout_skips_implementation() {
        let project = TestProject::new().expect("project");
        let config = PipelineConfig::default();
        let settings = AgentSettings::from_config(project.root(), &config);
        let paths = TaskPaths::new(project.task_dir());
        let worker = ScriptedWorker::new(vec![worker_timeout()]);
        let runner = ScriptedRunner::new(Vec::new());

        let verdict = SubtaskRunner::new(&settings, &config, TaskType::App)
            .run(&worker, &runner, 1, &subtask(), &paths)
            .expect("cycle");

        assert_eq!(verdict.status, SubtaskStatus::Failed);
        assert_eq!(verdict.record.status, PhaseStatus::Failed);
        assert_eq!(verdict.record.executor_status, Some(StageStatus::Skipped));
        assert!(
            verdict
                .record
                .signals
                .iter()
                .any(|s| s.kind == SignalKind::WorkerTimeout)
        );
        worker.assert_drained();
        runner.assert_drained();
    }

    /// Verifies unconfirmed RED is soft: the cycle still implements and completes.
    #[test]
    fn unconfirmed_red_is_soft() {
        let project = TestProject::new().expect("project");
        let config = PipelineConfig::default();
        let settings = AgentSettings::from_config(project.root(), &config);
        let paths = TaskPaths::new(project.task_dir());
        let worker = ScriptedWorker::new(vec![
            tests_output(),
            worker_output(&[("implementation-notes.md", "done")]),
        ]);
        let runner = ScriptedRunner::new(vec![
            CommandOutcome::exited(0, "passes already"),
            CommandOutcome::exited(0, "ok"),
        ]);

        let verdict = SubtaskRunner::new(&settings, &config, TaskType::Infrastructure)
            .run(&worker, &runner, 1, &subtask(), &paths)
            .expect("cycle");

        assert_eq!(verdict.status, SubtaskStatus::Complete);
        assert_eq!(verdict.record.tdd_status, Some(StageStatus::RedNotVerified));
        assert!(
            verdict
                .record
                .signals
                .iter()
                .any(|s| s.kind == SignalKind::VerificationUnconfirmed)
        );
    }

    /// Verifies an implementer crash fails the subtask after RED ran.
    #[test]
    fn implementer_error_fails_subtask() {
        let project = TestProject::new().expect("project");
        let config = PipelineConfig::default();
        let settings = AgentSettings::from_config(project.root(), &config);
        let paths = TaskPaths::new(project.task_dir());
        let worker = ScriptedWorker::new(vec![
            tests_output(),
            worker_crash("rate limited"),
        ]);
        let runner = ScriptedRunner::new(vec![CommandOutcome::exited(1, "not ok")]);

        let verdict = SubtaskRunner::new(&settings, &config, TaskType::Infrastructure)
            .run(&worker, &runner, 1, &subtask(), &paths)
            .expect("cycle");

        assert_eq!(verdict.status, SubtaskStatus::Failed);
        assert_eq!(verdict.reason.as_deref(), Some("error: rate limited"));
        assert!(verdict.record.green_verification.is_none());
        runner.assert_drained();
    }
}
