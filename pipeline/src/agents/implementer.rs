//! Implementation step of a subtask cycle.

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument};

use crate::agents::{AgentSettings, RoleOutcome, invoke_and_save};
use crate::core::artifacts::cap_artifact_lines;
use crate::core::types::Subtask;
use crate::io::config::WorkerProfile;
use crate::io::worker::Worker;

pub const NOTES_ARTIFACT: &str = "implementation-notes.md";

/// Makes the authored tests pass.
pub struct ImplementerAgent<'a> {
    settings: &'a AgentSettings,
    profile: &'a WorkerProfile,
    max_notes_lines: usize,
}

impl<'a> ImplementerAgent<'a> {
    pub fn new(
        settings: &'a AgentSettings,
        profile: &'a WorkerProfile,
        max_notes_lines: usize,
    ) -> Self {
        Self {
            settings,
            profile,
            max_notes_lines,
        }
    }

    #[instrument(skip_all, fields(worker = %self.profile.definition, subtask = subtask.number))]
    pub fn run<W: Worker + ?Sized>(
        &self,
        worker: &W,
        subtask: &Subtask,
        tests_dir: &Path,
        test_spec: Option<&str>,
        executor_dir: &Path,
    ) -> Result<RoleOutcome> {
        let tests_dir = tests_dir
            .strip_prefix(&self.settings.project_root)
            .unwrap_or(tests_dir);
        let prompt = self.settings.prompts().build_executor(
            subtask,
            &tests_dir.display().to_string(),
            test_spec,
            self.max_notes_lines,
        )?;
        info!(title = %subtask.title, "implementing subtask");
        let request = self
            .settings
            .request(self.profile, prompt, executor_dir, NOTES_ARTIFACT);
        let max_lines = self.max_notes_lines;
        invoke_and_save(worker, &request, executor_dir, |artifacts| {
            cap_artifact_lines(artifacts, NOTES_ARTIFACT, max_lines, "")
                .into_iter()
                .collect()
        })
    }
}
