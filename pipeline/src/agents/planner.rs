//! Planning phase agent.

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::agents::{AgentSettings, RoleOutcome, invoke_and_save};
use crate::core::subtasks::{PlannedSubtasks, plan_subtasks};
use crate::core::types::WorkerResult;
use crate::io::artifacts::{read_artifact, remove_artifacts};
use crate::io::config::WorkerProfile;
use crate::io::worker::Worker;

pub const PLAN_ARTIFACT: &str = "plan.md";
pub const SUBTASKS_ARTIFACT: &str = "subtasks.json";

/// Turns the analysis into a plan and a structured subtask list.
pub struct PlannerAgent<'a> {
    settings: &'a AgentSettings,
    profile: &'a WorkerProfile,
}

impl<'a> PlannerAgent<'a> {
    pub fn new(settings: &'a AgentSettings, profile: &'a WorkerProfile) -> Self {
        Self { settings, profile }
    }

    /// Plan artifacts from an earlier attempt are removed first, so nothing on
    /// disk outlives the attempt that wrote it.
    #[instrument(skip_all, fields(worker = %self.profile.definition))]
    pub fn run<W: Worker + ?Sized>(
        &self,
        worker: &W,
        analysis: &str,
        out_dir: &Path,
    ) -> Result<RoleOutcome> {
        remove_artifacts(out_dir, &[PLAN_ARTIFACT, SUBTASKS_ARTIFACT])?;
        let prompt = self.settings.prompts().build_planner(analysis)?;
        info!(prompt_bytes = prompt.len(), "running planning");
        let request = self
            .settings
            .request(self.profile, prompt, out_dir, PLAN_ARTIFACT);
        invoke_and_save(worker, &request, out_dir, |_| Vec::new())
    }
}

/// Subtask list from a planner result that just completed.
pub fn planned_subtasks(result: &WorkerResult) -> PlannedSubtasks {
    with_fallback_warning(plan_subtasks(
        result.artifact(SUBTASKS_ARTIFACT),
        result.artifact(PLAN_ARTIFACT),
    ))
}

/// Subtask list from the planner's saved artifacts, for runs resuming past
/// the planner.
pub fn read_planned_subtasks(planner_dir: &Path) -> Result<PlannedSubtasks> {
    let subtasks_json = read_artifact(planner_dir, SUBTASKS_ARTIFACT)?;
    let plan = read_artifact(planner_dir, PLAN_ARTIFACT)?;
    Ok(with_fallback_warning(plan_subtasks(
        subtasks_json.as_deref(),
        plan.as_deref(),
    )))
}

fn with_fallback_warning(planned: PlannedSubtasks) -> PlannedSubtasks {
    if let Some(signal) = &planned.fallback {
        warn!(reason = %signal.message, "using plan fallback");
    }
    planned
}
