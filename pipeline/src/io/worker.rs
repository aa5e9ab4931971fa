//! Worker invocation contract.
//!
//! The [`Worker`] trait decouples phase orchestration from the actual agent
//! backend (currently `claude --print`). Tests use scripted workers that return
//! predetermined outputs without spawning processes.
//!
//! [`invoke_worker`] turns a raw process outcome into a [`WorkerResult`]:
//! launch failures and non-zero exits become `status=error`, an expired
//! timeout becomes `status=timeout`, and every other run is `complete` with
//! artifacts extracted from the output text.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::artifacts::extract_artifacts;
use crate::core::types::WorkerResult;
use crate::io::process::{
    CommandOutcome, CommandRunner, CommandSpec, SystemRunner, write_command_log,
};
use crate::io::worker_def::load_definition;

/// Parameters for one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    /// Worker definition name (`.claude/agents/<definition>.md`).
    pub definition: String,
    /// Model override; `None` uses the definition's model.
    pub model: Option<String>,
    pub prompt: String,
    /// Project root the worker operates on.
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    /// Where to persist the bounded stdout/stderr log.
    pub log_path: Option<PathBuf>,
    /// Artifact name used when the output has no delimited blocks.
    pub default_artifact: String,
}

/// Abstraction over worker backends.
pub trait Worker {
    /// Run the worker. `Err` means it could not be launched at all.
    fn run(&self, request: &WorkerRequest) -> Result<CommandOutcome>;
}

/// Worker that spawns the `claude` CLI with a definition from `.claude/agents/`.
pub struct ClaudeWorker {
    program: String,
}

impl ClaudeWorker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Worker for ClaudeWorker {
    fn run(&self, request: &WorkerRequest) -> Result<CommandOutcome> {
        let definition = load_definition(&request.workdir, &request.definition)?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| definition.model.clone());
        let spec = CommandSpec::new(
            self.program.clone(),
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )
        .arg("--print")
        .arg("--agent")
        .arg(definition.name.clone())
        .arg("--model")
        .arg(model.clone())
        .arg("--output-format")
        .arg("json")
        .arg("--permission-mode")
        .arg("bypassPermissions")
        .stdin(request.prompt.clone());

        info!(
            worker = %request.definition,
            program = %self.program,
            agent = %definition.name,
            model = %model,
            prompt_bytes = request.prompt.len(),
            "issuing worker command"
        );
        SystemRunner.run(&spec)
    }
}

/// Invoke a worker and classify its outcome.
///
/// Only a failure to write the worker log is returned as `Err`; every worker
/// failure is reported through the result status.
#[instrument(
    skip_all,
    fields(worker = %request.definition, timeout_secs = request.timeout.as_secs())
)]
pub fn invoke_worker<W: Worker + ?Sized>(
    worker: &W,
    request: &WorkerRequest,
) -> Result<WorkerResult> {
    info!(worker = %request.definition, "worker starting");
    let outcome = match worker.run(request) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(
                worker = %request.definition,
                err = %format!("{err:#}"),
                "worker failed to launch"
            );
            let result = WorkerResult::error(String::new(), format!("{err:#}"));
            write_log(request, &format!("[launch failed: {err:#}]\n"))?;
            return Ok(result);
        }
    };

    if let Some(path) = &request.log_path {
        let header = format!("$ worker {}", request.definition);
        write_command_log(path, &outcome.render_log(&header, request.output_limit_bytes))?;
    }

    let result = classify_outcome(&outcome, request);
    match result.status {
        status if status.is_hard_failure() => warn!(
            worker = %request.definition,
            status = %status,
            error = result.error.as_deref().unwrap_or_default(),
            "worker failed"
        ),
        status => info!(
            worker = %request.definition,
            status = %status,
            artifacts = result.artifacts.len(),
            "worker finished"
        ),
    }
    Ok(result)
}

fn classify_outcome(outcome: &CommandOutcome, request: &WorkerRequest) -> WorkerResult {
    match outcome {
        CommandOutcome::NotFound { program } => WorkerResult::error(
            String::new(),
            format!("worker executable not found: {program}"),
        ),
        CommandOutcome::TimedOut { stdout, .. } => WorkerResult::timeout(
            stdout.clone(),
            format!("timed out after {}s", request.timeout.as_secs()),
        ),
        CommandOutcome::Exited {
            code: Some(0),
            stdout,
            ..
        } => {
            let (text, is_error) = result_text(stdout);
            if is_error {
                return WorkerResult::error(text.clone(), "worker reported an error result");
            }
            let artifacts = extract_artifacts(&text, &request.default_artifact);
            debug!(artifacts = ?artifacts.keys().collect::<Vec<_>>(), "extracted artifacts");
            WorkerResult::complete(text, artifacts)
        }
        CommandOutcome::Exited {
            code,
            stdout,
            stderr,
            ..
        } => {
            let detail = if stderr.trim().is_empty() {
                match code {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                }
            } else {
                stderr.trim().to_string()
            };
            WorkerResult::error(stdout.clone(), detail)
        }
    }
}

/// Pull the `result` field out of JSON output, falling back to the raw text.
fn result_text(stdout: &str) -> (String, bool) {
    match serde_json::from_str::<Value>(stdout) {
        Ok(Value::Object(map)) => {
            let is_error = map.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            let text = match map.get("result") {
                Some(Value::String(text)) => text.clone(),
                _ => stdout.to_string(),
            };
            (text, is_error)
        }
        _ => (stdout.to_string(), false),
    }
}

fn write_log(request: &WorkerRequest, contents: &str) -> Result<()> {
    match &request.log_path {
        Some(path) => write_command_log(path, contents),
        None => Ok(()),
    }
}
