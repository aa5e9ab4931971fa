//! Analysis phase agent.

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument};

use crate::agents::{AgentSettings, RoleOutcome, invoke_and_save};
use crate::io::config::WorkerProfile;
use crate::io::worker::Worker;

pub const ANALYSIS_ARTIFACT: &str = "analysis.md";

/// Turns the raw task text into an analysis artifact.
pub struct ArchitectAgent<'a> {
    settings: &'a AgentSettings,
    profile: &'a WorkerProfile,
}

impl<'a> ArchitectAgent<'a> {
    pub fn new(settings: &'a AgentSettings, profile: &'a WorkerProfile) -> Self {
        Self { settings, profile }
    }

    #[instrument(skip_all, fields(worker = %self.profile.definition))]
    pub fn run<W: Worker + ?Sized>(
        &self,
        worker: &W,
        issue: &str,
        out_dir: &Path,
    ) -> Result<RoleOutcome> {
        let prompt = self.settings.prompts().build_architect(issue)?;
        info!(prompt_bytes = prompt.len(), "running analysis");
        let request = self
            .settings
            .request(self.profile, prompt, out_dir, ANALYSIS_ARTIFACT);
        invoke_and_save(worker, &request, out_dir, |_| Vec::new())
    }
}
