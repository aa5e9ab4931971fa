//! Integration and smoke gate runners.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::gates::GateOutcome;
use crate::io::config::{SmokeConfig, TestCommand};
use crate::io::process::{CommandOutcome, CommandRunner, CommandSpec, write_command_log};
use crate::io::task_store::TaskPaths;

/// Shell convention for "command not found".
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Run the project's full test command once and record its output.
#[instrument(skip_all, fields(command = %command.command.join(" ")))]
pub fn run_integration<R: CommandRunner + ?Sized>(
    runner: &R,
    command: &TestCommand,
    project_root: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
    output_path: &Path,
) -> Result<GateOutcome> {
    let workdir = command
        .workdir
        .as_ref()
        .map_or_else(|| project_root.to_path_buf(), |dir| project_root.join(dir));
    let spec = CommandSpec::from_argv(&command.command, workdir, timeout, output_limit_bytes)?;
    info!(command = %spec.display(), "running integration tests");
    let outcome = runner.run(&spec)?;
    write_command_log(
        output_path,
        &outcome.render_log(&format!("$ {}", spec.display()), output_limit_bytes),
    )?;

    let gate = match outcome {
        CommandOutcome::Exited { code: Some(0), .. } => GateOutcome::Passed,
        CommandOutcome::Exited {
            code: Some(EXIT_COMMAND_NOT_FOUND),
            ..
        }
        | CommandOutcome::NotFound { .. } => GateOutcome::RunnerNotFound {
            program: spec.program.clone(),
        },
        CommandOutcome::Exited { code, .. } => GateOutcome::Failed { exit_code: code },
        CommandOutcome::TimedOut { .. } => GateOutcome::TimedOut {
            timeout_secs: timeout.as_secs(),
        },
    };
    if matches!(gate, GateOutcome::RunnerNotFound { .. }) {
        warn!(program = %spec.program, "integration test runner not found, continuing");
    }
    Ok(gate)
}

/// First configured smoke script found in the task directory, then `02-planner/`.
pub fn find_smoke_script(paths: &TaskPaths, smoke: &SmokeConfig) -> Option<PathBuf> {
    [paths.root.clone(), paths.planner_dir()]
        .iter()
        .flat_map(|dir| smoke.scripts.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Run the task's smoke script if there is one.
#[instrument(skip_all, fields(task_dir = %paths.root.display()))]
pub fn run_smoke<R: CommandRunner + ?Sized>(
    runner: &R,
    paths: &TaskPaths,
    smoke: &SmokeConfig,
    project_root: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<GateOutcome> {
    let output_path = paths.smoke_output();
    let Some(script) = find_smoke_script(paths, smoke) else {
        let reason = format!("no smoke test script ({})", smoke.scripts.join(", "));
        info!(reason = %reason, "smoke test skipped");
        write_command_log(&output_path, &format!("[skipped: {reason}]\n"))?;
        return Ok(GateOutcome::Absent { reason });
    };

    let spec = CommandSpec::new(
        smoke.interpreter.clone(),
        project_root,
        timeout,
        output_limit_bytes,
    )
    .arg(script.display().to_string());
    info!(command = %spec.display(), "running smoke test");
    let outcome = runner.run(&spec)?;
    write_command_log(
        &output_path,
        &outcome.render_log(&format!("$ {}", spec.display()), output_limit_bytes),
    )?;

    Ok(match outcome {
        CommandOutcome::Exited { code: Some(0), .. } => GateOutcome::Passed,
        CommandOutcome::Exited { code, .. } => GateOutcome::Failed { exit_code: code },
        CommandOutcome::TimedOut { .. } => GateOutcome::TimedOut {
            timeout_secs: timeout.as_secs(),
        },
        CommandOutcome::NotFound { program } => GateOutcome::RunnerNotFound { program },
    })
}
