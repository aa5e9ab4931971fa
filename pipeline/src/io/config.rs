//! Pipeline configuration stored under `.task-pipeline/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::TaskType;

/// Default config location relative to the project root.
pub const CONFIG_RELATIVE_PATH: &str = ".task-pipeline/config.toml";

/// Pipeline configuration (TOML).
///
/// Missing fields default to the values the pipeline was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-invocation worker timeout in seconds.
    pub worker_timeout_secs: u64,
    /// Per-file RED/GREEN verification timeout in seconds.
    pub verify_timeout_secs: u64,
    /// Timeout for test runner availability probes.
    pub probe_timeout_secs: u64,
    pub integration_timeout_secs: u64,
    pub smoke_timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Byte budget for a rendered prompt before sections are dropped.
    pub prompt_budget_bytes: usize,
    /// Verification runs at most this many test files per batch.
    pub max_test_files: usize,
    pub test_spec_max_lines: usize,
    pub notes_max_lines: usize,
    /// Subtask failures tolerated before the loop halts (`0` = unlimited).
    pub max_failures: u32,
    /// Task directories are created here, relative to the project root.
    pub tasks_dir: PathBuf,
    /// Executable invoked for every worker.
    pub worker_program: String,
    pub workers: WorkersConfig,
    pub verify: PerTaskType<TestCommand>,
    pub integration: PerTaskType<TestCommand>,
    pub smoke: SmokeConfig,
}

/// Which worker definition (and model) each role uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkersConfig {
    pub architect: WorkerProfile,
    pub planner: WorkerProfile,
    /// Test author and implementer for `app` tasks.
    pub app: WorkerProfile,
    /// Test author and implementer for `infrastructure` tasks.
    pub infrastructure: WorkerProfile,
}

impl WorkersConfig {
    pub fn for_task_type(&self, task_type: TaskType) -> &WorkerProfile {
        match task_type {
            TaskType::App => &self.app,
            TaskType::Infrastructure => &self.infrastructure,
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            architect: WorkerProfile::new("architect", None),
            planner: WorkerProfile::new("architect", Some("sonnet")),
            app: WorkerProfile::new("tdd-developer", Some("sonnet")),
            infrastructure: WorkerProfile::new("dx-engineer", Some("sonnet")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerProfile {
    /// Name of the worker definition under `.claude/agents/`.
    pub definition: String,
    /// Overrides the model declared by the definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl WorkerProfile {
    pub fn new(definition: &str, model: Option<&str>) -> Self {
        Self {
            definition: definition.to_string(),
            model: model.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerTaskType<T> {
    pub app: T,
    pub infrastructure: T,
}

impl<T> PerTaskType<T> {
    pub fn get(&self, task_type: TaskType) -> &T {
        match task_type {
            TaskType::App => &self.app,
            TaskType::Infrastructure => &self.infrastructure,
        }
    }
}

/// A test command and where to run it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCommand {
    /// Argv prefix. Verification appends the test file path.
    pub command: Vec<String>,
    /// Availability check run once before a verification batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<Vec<String>>,
    /// Relative to the project root. Verification defaults to the subtask's
    /// `tdd/` directory, gates to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

impl TestCommand {
    fn new(command: &[&str], probe: Option<&[&str]>, workdir: Option<&str>) -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|p| (*p).to_string()).collect();
        Self {
            command: argv(command),
            probe: probe.map(argv),
            workdir: workdir.map(PathBuf::from),
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("{label}.command must be a non-empty array"));
        }
        if let Some(probe) = &self.probe
            && (probe.is_empty() || probe[0].trim().is_empty())
        {
            return Err(anyhow!("{label}.probe must be a non-empty array"));
        }
        Ok(())
    }
}

impl Default for PerTaskType<TestCommand> {
    fn default() -> Self {
        Self {
            app: TestCommand::new(
                &["npx", "vitest", "run", "--reporter=verbose"],
                Some(&["npx", "vitest", "--version"]),
                Some("app"),
            ),
            infrastructure: TestCommand::new(&["bash"], None, None),
        }
    }
}

fn default_integration() -> PerTaskType<TestCommand> {
    PerTaskType {
        app: TestCommand::new(&["npx", "vitest", "run"], None, Some("app")),
        infrastructure: TestCommand::new(&["just", "test"], None, None),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SmokeConfig {
    /// Script names searched in the task directory, then in `02-planner/`.
    pub scripts: Vec<String>,
    /// Interpreter the script is passed to.
    pub interpreter: String,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            scripts: vec!["smoke-test.sh".to_string()],
            interpreter: "bash".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_timeout_secs: 600,
            verify_timeout_secs: 120,
            probe_timeout_secs: 10,
            integration_timeout_secs: 300,
            smoke_timeout_secs: 120,
            output_limit_bytes: 1_000_000,
            prompt_budget_bytes: 200_000,
            max_test_files: 5,
            test_spec_max_lines: 100,
            notes_max_lines: 50,
            max_failures: 3,
            tasks_dir: PathBuf::from("tasks"),
            worker_program: "claude".to_string(),
            workers: WorkersConfig::default(),
            verify: PerTaskType::default(),
            integration: default_integration(),
            smoke: SmokeConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("worker_timeout_secs", self.worker_timeout_secs),
            ("verify_timeout_secs", self.verify_timeout_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("integration_timeout_secs", self.integration_timeout_secs),
            ("smoke_timeout_secs", self.smoke_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.max_test_files == 0 {
            return Err(anyhow!("max_test_files must be > 0"));
        }
        if self.worker_program.trim().is_empty() {
            return Err(anyhow!("worker_program must not be empty"));
        }
        let profiles = [
            ("workers.architect", &self.workers.architect),
            ("workers.planner", &self.workers.planner),
            ("workers.app", &self.workers.app),
            ("workers.infrastructure", &self.workers.infrastructure),
        ];
        for (name, profile) in profiles {
            if profile.definition.trim().is_empty() {
                return Err(anyhow!("{name}.definition must not be empty"));
            }
        }
        self.verify.app.validate("verify.app")?;
        self.verify.infrastructure.validate("verify.infrastructure")?;
        self.integration.app.validate("integration.app")?;
        self.integration
            .infrastructure
            .validate("integration.infrastructure")?;
        if self.smoke.interpreter.trim().is_empty() {
            return Err(anyhow!("smoke.interpreter must not be empty"));
        }
        Ok(())
    }
}

/// Config path used when `--config` is not given.
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_RELATIVE_PATH)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
