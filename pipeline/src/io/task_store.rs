//! Task directory layout and `task.json` persistence.
//!
//! ```text
//! <task_dir>/
//!   task.json
//!   issue.md
//!   01-architect/
//!   02-planner/
//!   03-subtask-01/{tdd,executor}/
//!   04-integration/test-output.txt
//!   05-smoke-test/smoke-output.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::metadata::TaskMetadata;
use crate::core::types::TaskType;

/// Resolved paths inside one task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    pub root: PathBuf,
}

impl TaskPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn metadata(&self) -> PathBuf {
        self.root.join("task.json")
    }

    pub fn issue(&self) -> PathBuf {
        self.root.join("issue.md")
    }

    pub fn architect_dir(&self) -> PathBuf {
        self.root.join("01-architect")
    }

    pub fn planner_dir(&self) -> PathBuf {
        self.root.join("02-planner")
    }

    pub fn subtask_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("03-subtask-{index:02}"))
    }

    pub fn tdd_dir(&self, index: u32) -> PathBuf {
        self.subtask_dir(index).join("tdd")
    }

    pub fn executor_dir(&self, index: u32) -> PathBuf {
        self.subtask_dir(index).join("executor")
    }

    pub fn integration_output(&self) -> PathBuf {
        self.root.join("04-integration").join("test-output.txt")
    }

    pub fn smoke_output(&self) -> PathBuf {
        self.root.join("05-smoke-test").join("smoke-output.txt")
    }
}

/// Load/save access to one task directory.
#[derive(Debug, Clone)]
pub struct TaskStore {
    paths: TaskPaths,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: TaskPaths::new(root),
        }
    }

    pub fn paths(&self) -> &TaskPaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    /// Load `task.json`, or `None` if this is a fresh task directory.
    pub fn load(&self) -> Result<Option<TaskMetadata>> {
        let path = self.paths.metadata();
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read task metadata {}", path.display()))?;
        let meta: TaskMetadata = serde_json::from_str(&contents)
            .with_context(|| format!("parse task metadata {}", path.display()))?;
        Ok(Some(meta))
    }

    /// Load existing metadata or initialize it.
    ///
    /// The task type is fixed at creation; a different `task_type` on resume is
    /// ignored with a warning.
    pub fn load_or_create(
        &self,
        task_type: TaskType,
        max_failures: u32,
        now: DateTime<Utc>,
    ) -> Result<TaskMetadata> {
        if let Some(meta) = self.load()? {
            if meta.task_type != task_type {
                warn!(
                    stored = %meta.task_type,
                    requested = %task_type,
                    "task type is fixed at creation, ignoring requested type"
                );
            }
            return Ok(meta);
        }
        debug!(task_dir = %self.root().display(), "initializing task metadata");
        let meta = TaskMetadata::new(task_type, max_failures, now);
        self.save(&meta)?;
        Ok(meta)
    }

    /// Atomically replace `task.json` (temp file + rename).
    pub fn save(&self, meta: &TaskMetadata) -> Result<()> {
        let path = self.paths.metadata();
        fs::create_dir_all(&self.paths.root)
            .with_context(|| format!("create task dir {}", self.paths.root.display()))?;
        let mut buf = serde_json::to_string_pretty(meta).context("serialize task metadata")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .with_context(|| format!("write temp task metadata {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("write task metadata {}", path.display()))?;
        Ok(())
    }

    pub fn write_issue(&self, text: &str) -> Result<()> {
        let path = self.paths.issue();
        fs::create_dir_all(&self.paths.root)
            .with_context(|| format!("create task dir {}", self.paths.root.display()))?;
        fs::write(&path, text).with_context(|| format!("write issue {}", path.display()))
    }

    pub fn read_issue(&self) -> Result<String> {
        let path = self.paths.issue();
        fs::read_to_string(&path).with_context(|| format!("read issue {}", path.display()))
    }
}
