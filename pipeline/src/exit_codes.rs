//! Stable exit codes for the CLI.

use crate::pipeline::PipelineStop;

/// Task complete, or paused at the requested phase.
pub const OK: i32 = 0;
/// Invalid input, configuration, or task directory, or another runtime error.
pub const INVALID: i32 = 1;
/// Analysis or planning failed.
pub const PHASE_FAILED: i32 = 2;
/// Too many subtasks failed.
pub const THRESHOLD_EXCEEDED: i32 = 3;
pub const INTEGRATION_FAILED: i32 = 4;
pub const SMOKE_FAILED: i32 = 5;

pub fn for_stop(stop: &PipelineStop) -> i32 {
    match stop {
        PipelineStop::Complete | PipelineStop::Paused { .. } => OK,
        PipelineStop::PhaseFailed { .. } => PHASE_FAILED,
        PipelineStop::ThresholdExceeded { .. } => THRESHOLD_EXCEEDED,
        PipelineStop::IntegrationFailed { .. } => INTEGRATION_FAILED,
        PipelineStop::SmokeFailed { .. } => SMOKE_FAILED,
    }
}
