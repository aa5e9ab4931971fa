//! Test authoring step of a subtask cycle.

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::agents::{AgentSettings, RoleOutcome, invoke_and_save};
use crate::core::artifacts::cap_artifact_lines;
use crate::core::types::{Subtask, TaskType};
use crate::io::config::WorkerProfile;
use crate::io::worker::Worker;

pub const TEST_SPEC_ARTIFACT: &str = "test-spec.md";

const SPEC_HINT: &str = "Code belongs in test files, not here.";
/// More fenced blocks than this suggests test code leaked into `test-spec.md`.
const MAX_SPEC_CODE_BLOCKS: usize = 2;

/// Writes failing tests plus a short test specification for one subtask.
pub struct TestAuthorAgent<'a> {
    settings: &'a AgentSettings,
    profile: &'a WorkerProfile,
    task_type: TaskType,
    max_spec_lines: usize,
}

impl<'a> TestAuthorAgent<'a> {
    pub fn new(
        settings: &'a AgentSettings,
        profile: &'a WorkerProfile,
        task_type: TaskType,
        max_spec_lines: usize,
    ) -> Self {
        Self {
            settings,
            profile,
            task_type,
            max_spec_lines,
        }
    }

    #[instrument(skip_all, fields(worker = %self.profile.definition, subtask = subtask.number))]
    pub fn run<W: Worker + ?Sized>(
        &self,
        worker: &W,
        subtask: &Subtask,
        tdd_dir: &Path,
    ) -> Result<RoleOutcome> {
        let prompt =
            self.settings
                .prompts()
                .build_tdd(subtask, self.task_type, self.max_spec_lines)?;
        info!(title = %subtask.title, "authoring tests");
        let request = self
            .settings
            .request(self.profile, prompt, tdd_dir, TEST_SPEC_ARTIFACT);
        let max_lines = self.max_spec_lines;
        invoke_and_save(worker, &request, tdd_dir, |artifacts| {
            if let Some(spec) = artifacts.get(TEST_SPEC_ARTIFACT) {
                let blocks = spec.matches("```").count() / 2;
                if blocks > MAX_SPEC_CODE_BLOCKS {
                    warn!(blocks, "test spec contains code blocks");
                }
            }
            cap_artifact_lines(artifacts, TEST_SPEC_ARTIFACT, max_lines, SPEC_HINT)
                .into_iter()
                .collect()
        })
    }
}
