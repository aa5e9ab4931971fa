//! One wrapper per worker role.
//!
//! Each agent owns its prompt, its default artifact name, and the size caps on
//! its artifacts. Verification of authored tests happens in [`crate::cycle`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::artifacts::artifact_relative_path;
use crate::core::types::{Artifacts, Signal, WorkerResult, WorkerStatus};
use crate::io::artifacts::save_artifacts;
use crate::io::config::{PipelineConfig, WorkerProfile};
use crate::io::prompt::PromptBuilder;
use crate::io::worker::{Worker, WorkerRequest, invoke_worker};

pub mod architect;
pub mod implementer;
pub mod planner;
pub mod test_author;

/// Log file written next to each role's artifacts.
pub const WORKER_LOG: &str = "worker.log";

/// Settings shared by every role.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub project_root: PathBuf,
    pub worker_timeout: Duration,
    pub output_limit_bytes: usize,
    pub prompt_budget_bytes: usize,
}

impl AgentSettings {
    pub fn from_config(project_root: &Path, config: &PipelineConfig) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            worker_timeout: Duration::from_secs(config.worker_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            prompt_budget_bytes: config.prompt_budget_bytes,
        }
    }

    pub(crate) fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new(self.prompt_budget_bytes)
    }

    pub(crate) fn request(
        &self,
        profile: &WorkerProfile,
        prompt: String,
        artifact_dir: &Path,
        default_artifact: &str,
    ) -> WorkerRequest {
        WorkerRequest {
            definition: profile.definition.clone(),
            model: profile.model.clone(),
            prompt,
            workdir: self.project_root.clone(),
            timeout: self.worker_timeout,
            output_limit_bytes: self.output_limit_bytes,
            log_path: Some(artifact_dir.join(WORKER_LOG)),
            default_artifact: default_artifact.to_string(),
        }
    }
}

/// A role's worker result after caps were applied and artifacts saved.
#[derive(Debug, Clone)]
pub struct RoleOutcome {
    pub result: WorkerResult,
    /// Soft signals raised by the role (e.g. truncated artifacts).
    pub signals: Vec<Signal>,
    /// Artifact names written to disk.
    pub saved: Vec<String>,
}

impl RoleOutcome {
    pub fn status(&self) -> WorkerStatus {
        self.result.status
    }
}

/// Invoke the worker, let `cap` adjust the artifacts, and persist them.
///
/// Failed invocations produce no artifacts, so nothing is written for them.
/// A successful invocation always persists at least one artifact: when every
/// name the worker chose is unsafe, the raw output is kept under the default.
pub(crate) fn invoke_and_save<W, F>(
    worker: &W,
    request: &WorkerRequest,
    artifact_dir: &Path,
    cap: F,
) -> Result<RoleOutcome>
where
    W: Worker + ?Sized,
    F: FnOnce(&mut Artifacts) -> Vec<Signal>,
{
    let mut result = invoke_worker(worker, request)?;
    if result.status.is_hard_failure() {
        return Ok(RoleOutcome {
            result,
            signals: Vec::new(),
            saved: Vec::new(),
        });
    }
    if !result
        .artifacts
        .keys()
        .any(|name| artifact_relative_path(name).is_some())
    {
        warn!(
            artifact = %request.default_artifact,
            "no savable artifact names, keeping raw output"
        );
        result
            .artifacts
            .insert(request.default_artifact.clone(), result.output.clone());
    }
    let signals = cap(&mut result.artifacts);
    let saved = save_artifacts(artifact_dir, &result.artifacts)?;
    debug!(dir = %artifact_dir.display(), saved = saved.len(), "saved role artifacts");
    Ok(RoleOutcome {
        result,
        signals,
        saved,
    })
}
