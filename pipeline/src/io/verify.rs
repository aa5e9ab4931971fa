//! Runs authored test files and classifies them as RED or GREEN.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::verification::{Expectation, FileResult, VerificationReport, classify};
use crate::io::config::TestCommand;
use crate::io::process::{CommandOutcome, CommandRunner, CommandSpec};

/// Test files live under this directory of a subtask's `tdd/` artifacts.
pub const TESTS_DIR: &str = "tests";

/// Everything needed to verify one batch of test files.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    /// Directory holding the authored `tests/` tree.
    pub tdd_dir: PathBuf,
    pub project_root: PathBuf,
    pub command: TestCommand,
    pub file_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_files: usize,
    pub output_limit_bytes: usize,
}

impl VerifyRequest {
    fn workdir(&self) -> PathBuf {
        match &self.command.workdir {
            Some(dir) => self.project_root.join(dir),
            None => self.tdd_dir.clone(),
        }
    }
}

/// Test files under `<tdd_dir>/tests`, sorted, at most `limit` of them.
///
/// A test file has `.test.` in its name.
pub fn discover_test_files(tdd_dir: &Path, limit: usize) -> Vec<PathBuf> {
    let root = tdd_dir.join(TESTS_DIR);
    if !root.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(&root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().contains(".test."))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    if files.len() > limit {
        debug!(found = files.len(), limit, "capping test files");
        files.truncate(limit);
    }
    files
}

/// Run the batch and classify it against `expectation`.
///
/// The runner being unavailable (probe failure, missing program, missing
/// working directory) yields a skipped report rather than an error.
#[instrument(
    skip_all,
    fields(expectation = expectation.as_str(), tdd_dir = %request.tdd_dir.display())
)]
pub fn run_verification<R: CommandRunner + ?Sized>(
    runner: &R,
    request: &VerifyRequest,
    expectation: Expectation,
) -> Result<VerificationReport> {
    let files = discover_test_files(&request.tdd_dir, request.max_files);
    if files.is_empty() {
        info!("no test files found, verification skipped");
        return Ok(VerificationReport::skipped("no test files found"));
    }
    let workdir = request.workdir();

    if let Some(probe) = &request.command.probe
        && let Some(reason) = probe_unavailable(runner, request, probe, &workdir)?
    {
        warn!(reason = %reason, "test runner unavailable, verification skipped");
        return Ok(VerificationReport::skipped(reason));
    }

    let mut results = Vec::with_capacity(files.len());
    for file in &files {
        let label = file
            .strip_prefix(&request.tdd_dir)
            .unwrap_or(file)
            .display()
            .to_string();
        let spec = CommandSpec::from_argv(
            &request.command.command,
            &workdir,
            request.file_timeout,
            request.output_limit_bytes,
        )?
        .arg(file.display().to_string());
        let result = match runner.run(&spec)? {
            CommandOutcome::Exited { code: Some(0), .. } => FileResult::passed(label),
            CommandOutcome::Exited { code, .. } => FileResult::failed(label, code),
            CommandOutcome::TimedOut { .. } => FileResult::timed_out(label),
            CommandOutcome::NotFound { program } => {
                FileResult::error(label, format!("{program} not found"))
            }
        };
        debug!(file = %result.file, outcome = ?result.outcome, "test file finished");
        results.push(result);
    }

    let report = classify(expectation, results);
    info!(
        verified = report.verified,
        skipped = report.skipped,
        reason = %report.reason,
        "verification finished"
    );
    Ok(report)
}

fn probe_unavailable<R: CommandRunner + ?Sized>(
    runner: &R,
    request: &VerifyRequest,
    probe: &[String],
    workdir: &Path,
) -> Result<Option<String>> {
    let spec = CommandSpec::from_argv(
        probe,
        workdir,
        request.probe_timeout,
        request.output_limit_bytes,
    )?;
    let reason = match runner.run(&spec)? {
        CommandOutcome::Exited { code: Some(0), .. } => return Ok(None),
        CommandOutcome::Exited { code, .. } => {
            format!("test runner unavailable: `{}` exited with {code:?}", spec.display())
        }
        CommandOutcome::TimedOut { .. } => {
            format!("test runner unavailable: `{}` timed out", spec.display())
        }
        CommandOutcome::NotFound { program } => {
            format!("test runner unavailable: {program} not found")
        }
    };
    Ok(Some(reason))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::ScriptedRunner;

    fn request(tdd_dir: &Path, probe: Option<Vec<String>>) -> VerifyRequest {
        VerifyRequest {
            tdd_dir: tdd_dir.to_path_buf(),
            project_root: tdd_dir.to_path_buf(),
            command: TestCommand {
                command: vec!["bash".to_string()],
                probe,
                workdir: None,
            },
            file_timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(10),
            max_files: 5,
            output_limit_bytes: 1_000,
        }
    }

    fn write_tests(dir: &Path, names: &[&str]) {
        for name in names {
            let path = dir.join(TESTS_DIR).join(name);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, "exit 1\n").expect("write test");
        }
    }

    #[test]
    fn discovery_filters_sorts_and_caps() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_tests(
            temp.path(),
            &[
                "c.test.sh",
                "a.test.sh",
                "nested/b.test.ts",
                "helper.sh",
                "d.test.sh",
            ],
        );
        let files = discover_test_files(temp.path(), 3);
        let names: Vec<String> = files
            .iter()
            .map(|f| {
                f.strip_prefix(temp.path().join(TESTS_DIR))
                    .expect("prefix")
                    .display()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.test.sh", "c.test.sh", "d.test.sh"]);
    }

    #[test]
    fn no_files_is_skipped_without_running_anything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(Vec::new());
        let report =
            run_verification(&runner, &request(temp.path(), None), Expectation::Red).expect("run");
        assert!(report.skipped);
        runner.assert_drained();
    }

    #[test]
    fn red_batch_runs_each_file_with_file_argument() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_tests(temp.path(), &["a.test.sh", "b.test.sh"]);
        let runner = ScriptedRunner::new(vec![
            CommandOutcome::exited(1, ""),
            CommandOutcome::TimedOut {
                stdout: String::new(),
                stderr: String::new(),
            },
        ]);
        let report =
            run_verification(&runner, &request(temp.path(), None), Expectation::Red).expect("run");
        assert!(report.verified);
        assert_eq!(report.results.len(), 2);

        let calls = runner.calls();
        assert_eq!(calls[0].program, "bash");
        assert!(calls[0].args[0].ends_with("tests/a.test.sh"));
        assert_eq!(calls[0].timeout, Duration::from_secs(120));
        assert_eq!(calls[0].workdir, temp.path());
    }

    #[test]
    fn failed_probe_skips_batch() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_tests(temp.path(), &["a.test.ts"]);
        let runner = ScriptedRunner::new(vec![CommandOutcome::exited(1, "")]);
        let probe = Some(vec!["npx".to_string(), "vitest".to_string(), "--version".to_string()]);
        let report =
            run_verification(&runner, &request(temp.path(), probe), Expectation::Green)
                .expect("run");
        assert!(report.skipped);
        assert!(report.reason.contains("test runner unavailable"));
        assert_eq!(runner.calls()[0].timeout, Duration::from_secs(10));
        runner.assert_drained();
    }

    #[test]
    fn green_batch_with_a_failure_is_not_verified() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_tests(temp.path(), &["a.test.sh", "b.test.sh"]);
        let runner = ScriptedRunner::new(vec![
            CommandOutcome::exited(0, ""),
            CommandOutcome::exited(1, ""),
        ]);
        let report = run_verification(&runner, &request(temp.path(), None), Expectation::Green)
            .expect("run");
        assert!(!report.verified);
        assert!(!report.skipped);
    }
}
