//! Test-only fakes and fixtures shared by unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use crate::io::process::{CommandOutcome, CommandRunner, CommandSpec};
use crate::io::worker::{Worker, WorkerRequest};

/// Successful worker stdout in the CLI's JSON envelope, one artifact block per entry.
pub fn worker_output(artifacts: &[(&str, &str)]) -> CommandOutcome {
    let text = artifacts
        .iter()
        .map(|(name, body)| format!("<artifact name=\"{name}\">\n{body}\n</artifact>"))
        .collect::<Vec<_>>()
        .join("\n\n");
    CommandOutcome::exited(0, serde_json::json!({ "result": text }).to_string())
}

/// A worker run that hit its timeout.
pub fn worker_timeout() -> CommandOutcome {
    CommandOutcome::TimedOut {
        stdout: String::new(),
        stderr: String::new(),
    }
}

/// A worker run that exited non-zero.
pub fn worker_crash(stderr: &str) -> CommandOutcome {
    CommandOutcome::Exited {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
        truncated_bytes: 0,
    }
}

/// Worker that replays queued outcomes in order and records every request.
///
/// Panics when invoked more times than outcomes were queued.
pub struct ScriptedWorker {
    outcomes: RefCell<VecDeque<CommandOutcome>>,
    requests: RefCell<Vec<WorkerRequest>>,
}

impl ScriptedWorker {
    pub fn new(outcomes: Vec<CommandOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.borrow().clone()
    }

    /// Definitions invoked so far, in order.
    pub fn invoked(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|r| r.definition.clone())
            .collect()
    }

    pub fn assert_drained(&self) {
        let left = self.outcomes.borrow().len();
        assert_eq!(left, 0, "{left} scripted worker outcomes were not consumed");
    }
}

impl Worker for ScriptedWorker {
    fn run(&self, request: &WorkerRequest) -> Result<CommandOutcome> {
        self.requests.borrow_mut().push(request.clone());
        let next = self.outcomes.borrow_mut().pop_front();
        match next {
            Some(outcome) => Ok(outcome),
            None => panic!(
                "scripted worker exhausted: unexpected invocation of {}",
                request.definition
            ),
        }
    }
}

/// Command runner that replays queued outcomes and records every spec.
pub struct ScriptedRunner {
    outcomes: RefCell<VecDeque<CommandOutcome>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<CommandOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn assert_drained(&self) {
        let left = self.outcomes.borrow().len();
        assert_eq!(left, 0, "{left} scripted command outcomes were not consumed");
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        self.calls.borrow_mut().push(spec.clone());
        let next = self.outcomes.borrow_mut().pop_front();
        match next {
            Some(outcome) => Ok(outcome),
            None => panic!(
                "scripted runner exhausted: unexpected command {}",
                spec.display()
            ),
        }
    }
}

/// Temporary project root with a task directory path inside it.
pub struct TestProject {
    temp: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// `tasks/00001-test-task` under the project root (not created).
    pub fn task_dir(&self) -> PathBuf {
        self.root().join("tasks").join("00001-test-task")
    }
}
