//! End-to-end orchestrator scenarios driven through scripted workers and
//! command runners.
//!
//! Each test queues the exact worker and command outcomes a run should
//! consume, then checks the stop reason, `task.json`, and the task directory
//! layout.

use std::fs;

use task_pipeline::core::metadata::TaskMetadata;
use task_pipeline::core::types::{PhaseStatus, SignalKind, StageStatus, TaskStatus, TaskType};
use task_pipeline::io::config::PipelineConfig;
use task_pipeline::io::process::CommandOutcome;
use task_pipeline::io::task_store::TaskStore;
use task_pipeline::pipeline::{PhaseSelection, PipelineRequest, PipelineStop, run_pipeline};
use task_pipeline::test_support::{
    ScriptedRunner, ScriptedWorker, TestProject, worker_crash, worker_output,
};

fn request(project: &TestProject, task_type: TaskType) -> PipelineRequest {
    PipelineRequest {
        project_root: project.root().to_path_buf(),
        task_dir: project.task_dir(),
        issue: "title:\tAdd health endpoint\nstate:\tOPEN\n--\nExpose /health".to_string(),
        task_type,
        phase: PhaseSelection::All,
        max_failures: None,
    }
}

fn subtasks_json(count: u32) -> String {
    let items: Vec<String> = (1..=count)
        .map(|n| {
            format!(
                r#"{{"number": {n}, "title": "Step {n}", "description": "Do step {n}", "files": ["src/step{n}.ts"], "depends_on": []}}"#
            )
        })
        .collect();
    format!("[{}]", items.join(", "))
}

fn analysis() -> CommandOutcome {
    worker_output(&[("analysis.md", "# Analysis")])
}

fn plan(count: u32) -> CommandOutcome {
    worker_output(&[
        ("plan.md", "# Plan"),
        ("subtasks.json", &subtasks_json(count)),
    ])
}

/// Test author output without test files: verification is skipped.
fn spec_only() -> CommandOutcome {
    worker_output(&[("test-spec.md", "- behaves")])
}

fn notes() -> CommandOutcome {
    worker_output(&[("implementation-notes.md", "done")])
}

fn load(project: &TestProject) -> TaskMetadata {
    TaskStore::new(project.task_dir())
        .load()
        .expect("load")
        .expect("task.json")
}

/// Verifies the threshold halts right after the failure that reaches it, and
/// that raising the limit resumes at the next unsettled subtask.
///
/// Plan: 4 subtasks, `max_failures = 2`.
/// 1. Subtask 1 fails (test author crash).
/// 2. Subtask 2 completes.
/// 3. Subtask 3 fails, threshold reached, subtask 4 never attempted.
/// 4. Rerun with the limit lifted runs only subtask 4 and the gates.
#[test]
fn threshold_halts_then_raised_limit_resumes() {
    let project = TestProject::new().expect("project");
    let config = PipelineConfig::default();
    let mut req = request(&project, TaskType::Infrastructure);
    req.max_failures = Some(2);

    let worker = ScriptedWorker::new(vec![
        analysis(),
        plan(4),
        worker_crash("subtask 1 crashed"),
        spec_only(),
        notes(),
        worker_crash("subtask 3 crashed"),
    ]);
    let runner = ScriptedRunner::new(Vec::new());

    let summary = run_pipeline(&req, &config, &worker, &runner).expect("run");

    assert_eq!(
        summary.stop,
        PipelineStop::ThresholdExceeded {
            failure_count: 2,
            max_failures: 2
        }
    );
    assert_eq!(summary.status, TaskStatus::FailedThreshold);
    assert_eq!(summary.subtasks_completed, 1);
    assert_eq!(summary.subtasks_failed, 2);
    let failed: Vec<u32> = summary.failed_subtasks.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![1, 3]);
    assert!(!project.task_dir().join("03-subtask-04").exists());
    worker.assert_drained();

    let meta = load(&project);
    assert_eq!(meta.failure_count, 2);
    assert_eq!(
        meta.last_record("subtask-3").expect("record").executor_status,
        Some(StageStatus::Skipped)
    );

    // Same limit: halts again before running anything.
    let worker = ScriptedWorker::new(Vec::new());
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("rerun");
    assert!(matches!(summary.stop, PipelineStop::ThresholdExceeded { .. }));

    // Lifted limit: only subtask 4 and the gates run.
    req.max_failures = Some(0);
    let worker = ScriptedWorker::new(vec![spec_only(), notes()]);
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "all green")]);
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("resume");

    assert_eq!(summary.stop, PipelineStop::Complete);
    assert_eq!(summary.subtasks_completed, 2);
    assert_eq!(summary.subtasks_failed, 2);
    assert_eq!(worker.invoked(), vec!["dx-engineer", "dx-engineer"]);
    worker.assert_drained();
    runner.assert_drained();

    let meta = load(&project);
    assert_eq!(meta.max_failures, 0);
    assert_eq!(meta.failure_count, 2);
    let subtask_records = meta
        .phases_completed
        .iter()
        .filter(|r| r.phase.starts_with("subtask-"))
        .count();
    assert_eq!(subtask_records, 4);
}

/// Verifies `max_failures = 0` never stops the loop.
#[test]
fn unlimited_failures_run_every_subtask() {
    let project = TestProject::new().expect("project");
    let mut req = request(&project, TaskType::Infrastructure);
    req.max_failures = Some(0);
    let worker = ScriptedWorker::new(vec![
        analysis(),
        plan(3),
        worker_crash("1"),
        worker_crash("2"),
        worker_crash("3"),
    ]);
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "ok")]);

    let summary = run_pipeline(&req, &PipelineConfig::default(), &worker, &runner).expect("run");

    assert_eq!(summary.stop, PipelineStop::Complete);
    assert_eq!(summary.subtasks_failed, 3);
    assert_eq!(load(&project).failure_count, 3);
    worker.assert_drained();
    runner.assert_drained();
}

/// Verifies a run paused after planning resumes without re-invoking the
/// analysis or planning workers.
#[test]
fn resume_after_planner_reads_plan_from_disk() {
    let project = TestProject::new().expect("project");
    let config = PipelineConfig::default();
    let mut req = request(&project, TaskType::Infrastructure);
    req.phase = PhaseSelection::Planner;

    let worker = ScriptedWorker::new(vec![analysis(), plan(1)]);
    let runner = ScriptedRunner::new(Vec::new());
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("plan");
    assert_eq!(
        summary.stop,
        PipelineStop::Paused {
            after: "planner".to_string()
        }
    );
    assert_eq!(summary.status, TaskStatus::PlannerComplete);

    req.phase = PhaseSelection::All;
    let worker = ScriptedWorker::new(vec![spec_only(), notes()]);
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "ok")]);
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("resume");

    assert_eq!(summary.stop, PipelineStop::Complete);
    assert_eq!(worker.requests().len(), 2);
    assert!(worker.requests()[0].prompt.contains("Step 1"));
    worker.assert_drained();

    let meta = load(&project);
    let planner_records = meta
        .phases_completed
        .iter()
        .filter(|r| r.phase == "planner")
        .count();
    assert_eq!(planner_records, 1);
}

/// Verifies a malformed subtask list runs one synthetic subtask carrying the plan.
#[test]
fn malformed_subtask_list_runs_plan_as_one_subtask() {
    let project = TestProject::new().expect("project");
    let worker = ScriptedWorker::new(vec![
        analysis(),
        worker_output(&[
            ("plan.md", "# Plan\n1. everything"),
            ("subtasks.json", r#"[{"number": "one"}]"#),
        ]),
        spec_only(),
        notes(),
    ]);
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "ok")]);

    let summary = run_pipeline(
        &request(&project, TaskType::Infrastructure),
        &PipelineConfig::default(),
        &worker,
        &runner,
    )
    .expect("run");

    assert_eq!(summary.stop, PipelineStop::Complete);
    assert_eq!(summary.subtasks_completed, 1);
    assert!(worker.requests()[2].prompt.contains("# Plan\n1. everything"));
    let meta = load(&project);
    let planner = meta.last_record("planner").expect("planner");
    assert_eq!(planner.signals[0].kind, SignalKind::ParseFallback);
}

/// Verifies RED with one failing and one passing file is unconfirmed but soft,
/// and that a smoke script written by the planner is run.
#[test]
fn mixed_red_batch_is_soft_and_smoke_script_runs() {
    let project = TestProject::new().expect("project");
    let worker = ScriptedWorker::new(vec![
        analysis(),
        worker_output(&[
            ("plan.md", "# Plan"),
            ("subtasks.json", &subtasks_json(1)),
            ("smoke-test.sh", "curl -f localhost/health"),
        ]),
        worker_output(&[
            ("tests/a.test.sh", "exit 1"),
            ("tests/b.test.sh", "exit 0"),
            ("test-spec.md", "- a\n- b"),
        ]),
        notes(),
    ]);
    let runner = ScriptedRunner::new(vec![
        CommandOutcome::exited(1, "a fails"),
        CommandOutcome::exited(0, "b passes"),
        CommandOutcome::exited(0, "a passes"),
        CommandOutcome::exited(0, "b passes"),
        CommandOutcome::exited(0, "integration ok"),
        CommandOutcome::exited(0, "smoke ok"),
    ]);

    let summary = run_pipeline(
        &request(&project, TaskType::Infrastructure),
        &PipelineConfig::default(),
        &worker,
        &runner,
    )
    .expect("run");

    assert_eq!(summary.stop, PipelineStop::Complete);
    let meta = load(&project);
    let record = meta.last_record("subtask-1").expect("subtask");
    assert_eq!(record.status, PhaseStatus::Complete);
    assert_eq!(record.tdd_status, Some(StageStatus::RedNotVerified));
    assert_eq!(record.executor_status, Some(StageStatus::GreenVerified));
    assert!(!record.red_verification.as_ref().expect("red").verified);
    assert!(
        record
            .signals
            .iter()
            .any(|s| s.kind == SignalKind::VerificationUnconfirmed)
    );
    assert_eq!(
        meta.last_record("smoke_test").expect("smoke").status,
        PhaseStatus::Passed
    );

    let calls = runner.calls();
    assert_eq!(calls[4].args, vec!["test"]);
    assert_eq!(calls[5].program, "bash");
    assert!(calls[5].args[0].ends_with("02-planner/smoke-test.sh"));
    runner.assert_drained();
}

/// Verifies nested test artifacts persist under the subtask's `tdd/` directory
/// and that app verification probes the runner before each batch.
#[test]
fn app_tests_persist_nested_and_probe_runs_first() {
    let project = TestProject::new().expect("project");
    let worker = ScriptedWorker::new(vec![
        analysis(),
        plan(2),
        spec_only(),
        notes(),
        worker_output(&[
            ("tests/subtask-02.test.ts", "it('works', () => expect(1).toBe(2))"),
            ("test-spec.md", "- works"),
        ]),
        notes(),
    ]);
    let runner = ScriptedRunner::new(vec![
        CommandOutcome::exited(0, "vitest 3.0.0"),
        CommandOutcome::exited(1, "1 failed"),
        CommandOutcome::exited(0, "vitest 3.0.0"),
        CommandOutcome::exited(0, "1 passed"),
        CommandOutcome::exited(0, "integration ok"),
    ]);

    let summary = run_pipeline(
        &request(&project, TaskType::App),
        &PipelineConfig::default(),
        &worker,
        &runner,
    )
    .expect("run");

    assert_eq!(summary.stop, PipelineStop::Complete);
    let test_file = project
        .task_dir()
        .join("03-subtask-02/tdd/tests/subtask-02.test.ts");
    assert!(test_file.is_file());
    assert!(
        worker.invoked()[2..]
            .iter()
            .all(|definition| definition == "tdd-developer")
    );

    let calls = runner.calls();
    assert_eq!(calls[0].args, vec!["vitest", "--version"]);
    assert_eq!(calls[0].workdir, project.root().join("app"));
    assert_eq!(
        calls[1].args.last().map(String::as_str),
        Some(test_file.display().to_string().as_str())
    );
    let record = load(&project);
    let record = record.last_record("subtask-2").expect("subtask 2");
    assert_eq!(record.tdd_status, Some(StageStatus::RedVerified));
    assert_eq!(record.executor_status, Some(StageStatus::GreenVerified));
}

/// Verifies a failed integration run stops the pipeline and a rerun resumes at
/// the integration gate.
#[test]
fn integration_failure_stops_and_rerun_resumes_at_gate() {
    let project = TestProject::new().expect("project");
    let config = PipelineConfig::default();
    let req = request(&project, TaskType::Infrastructure);
    let worker = ScriptedWorker::new(vec![analysis(), plan(1), spec_only(), notes()]);
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(2, "3 failed")]);

    let summary = run_pipeline(&req, &config, &worker, &runner).expect("run");
    assert_eq!(
        summary.stop,
        PipelineStop::IntegrationFailed {
            reason: "integration exited with code 2".to_string()
        }
    );
    assert_eq!(summary.status, TaskStatus::IntegrationFailed);
    let output = fs::read_to_string(project.task_dir().join("04-integration/test-output.txt"))
        .expect("integration output");
    assert!(output.contains("3 failed"));

    let worker = ScriptedWorker::new(Vec::new());
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "ok")]);
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("rerun");
    assert_eq!(summary.stop, PipelineStop::Complete);
    runner.assert_drained();

    let meta = load(&project);
    let integration: Vec<PhaseStatus> = meta
        .phases_completed
        .iter()
        .filter(|r| r.phase == "integration")
        .map(|r| r.status)
        .collect();
    assert_eq!(integration, vec![PhaseStatus::Failed, PhaseStatus::Passed]);
}

#[test]
fn failing_smoke_script_stops_pipeline() {
    let project = TestProject::new().expect("project");
    fs::create_dir_all(project.task_dir()).expect("mkdir");
    fs::write(project.task_dir().join("smoke-test.sh"), "exit 1\n").expect("write");
    let worker = ScriptedWorker::new(vec![analysis(), plan(1), spec_only(), notes()]);
    let runner = ScriptedRunner::new(vec![
        CommandOutcome::exited(0, "integration ok"),
        CommandOutcome::exited(1, "smoke failed"),
    ]);

    let summary = run_pipeline(
        &request(&project, TaskType::Infrastructure),
        &PipelineConfig::default(),
        &worker,
        &runner,
    )
    .expect("run");

    assert_eq!(summary.status, TaskStatus::SmokeTestFailed);
    assert!(matches!(summary.stop, PipelineStop::SmokeFailed { .. }));
    let meta = load(&project);
    assert_eq!(
        meta.last_record("smoke_test").expect("smoke").exit_code,
        Some(1)
    );
}

/// Verifies a threshold tripped by the last subtask still holds on a rerun with
/// the same limit, so the gates never run.
#[test]
fn threshold_tripped_by_last_subtask_holds_on_rerun() {
    let project = TestProject::new().expect("project");
    let config = PipelineConfig::default();
    let mut req = request(&project, TaskType::Infrastructure);
    req.max_failures = Some(1);

    let worker = ScriptedWorker::new(vec![analysis(), plan(1), worker_crash("crashed")]);
    let runner = ScriptedRunner::new(Vec::new());
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("run");
    assert_eq!(summary.status, TaskStatus::FailedThreshold);

    let worker = ScriptedWorker::new(Vec::new());
    let runner = ScriptedRunner::new(Vec::new());
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("rerun");

    assert_eq!(
        summary.stop,
        PipelineStop::ThresholdExceeded {
            failure_count: 1,
            max_failures: 1
        }
    );
    assert_eq!(summary.status, TaskStatus::FailedThreshold);
    assert!(runner.calls().is_empty());
    let meta = load(&project);
    assert!(meta.last_record("integration").is_none());
    assert!(meta.last_record("smoke_test").is_none());
}

/// Verifies a planner retry decides the subtask list from its own output, not
/// from the list a failed attempt left on disk.
#[test]
fn planner_retry_ignores_list_from_failed_attempt() {
    let project = TestProject::new().expect("project");
    let config = PipelineConfig::default();
    let req = request(&project, TaskType::Infrastructure);

    let worker = ScriptedWorker::new(vec![
        analysis(),
        worker_output(&[("plan.md", "# Plan"), ("subtasks.json", "[]")]),
    ]);
    let runner = ScriptedRunner::new(Vec::new());
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("run");
    assert_eq!(summary.status, TaskStatus::PlannerFailed);

    let worker = ScriptedWorker::new(vec![
        worker_output(&[("plan.md", "# Plan\n- retry everything")]),
        spec_only(),
        notes(),
    ]);
    let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "ok")]);
    let summary = run_pipeline(&req, &config, &worker, &runner).expect("retry");

    assert_eq!(summary.stop, PipelineStop::Complete);
    assert_eq!(summary.subtasks_completed, 1);
    assert!(worker.requests()[1].prompt.contains("- retry everything"));
    assert!(!project.task_dir().join("02-planner/subtasks.json").exists());
    let meta = load(&project);
    let planner = meta.last_record("planner").expect("planner");
    assert_eq!(planner.status, PhaseStatus::Complete);
    assert_eq!(planner.signals[0].kind, SignalKind::ParseFallback);
    worker.assert_drained();
}
