//! Subtask list decoding with schema + invariant checks and the plan fallback.

use std::collections::HashSet;

use jsonschema::Draft;
use serde_json::Value;

use crate::core::types::{Signal, SignalKind, Subtask};

const SUBTASKS_SCHEMA: &str = include_str!("../../schemas/subtasks.schema.json");

/// Title of the synthetic subtask produced by the plan fallback.
pub const FALLBACK_TITLE: &str = "Implement plan";

/// Subtasks to execute, plus the soft signal raised when the fallback was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSubtasks {
    pub subtasks: Vec<Subtask>,
    pub fallback: Option<Signal>,
}

/// Decide the subtask list from the planner's artifacts.
///
/// A structured list that decodes and validates wins, even when empty. A
/// missing or malformed list falls back to one synthetic subtask carrying the
/// whole plan, or to nothing when the plan is empty too.
pub fn plan_subtasks(subtasks_json: Option<&str>, plan: Option<&str>) -> PlannedSubtasks {
    let reason = match subtasks_json {
        Some(raw) => match decode_subtask_list(raw) {
            Ok(subtasks) => {
                return PlannedSubtasks {
                    subtasks,
                    fallback: None,
                };
            }
            Err(err) => format!("could not decode subtasks.json ({err})"),
        },
        None => "subtasks.json not produced".to_string(),
    };

    let plan = plan.unwrap_or_default();
    let subtasks = if plan.trim().is_empty() {
        Vec::new()
    } else {
        vec![fallback_subtask(plan)]
    };
    PlannedSubtasks {
        subtasks,
        fallback: Some(Signal::new(
            SignalKind::ParseFallback,
            format!("{reason}; falling back to plan.md"),
        )),
    }
}

/// Single subtask whose description is the entire plan text.
pub fn fallback_subtask(plan: &str) -> Subtask {
    Subtask {
        number: 1,
        title: FALLBACK_TITLE.to_string(),
        description: plan.to_string(),
        files: Vec::new(),
        depends_on: Vec::new(),
        reference_files: Vec::new(),
    }
}

/// Decode and validate a structured subtask list.
pub fn decode_subtask_list(raw: &str) -> Result<Vec<Subtask>, String> {
    let value: Value = serde_json::from_str(raw).map_err(|err| format!("invalid json: {err}"))?;
    validate_schema(&value)?;
    let subtasks: Vec<Subtask> =
        serde_json::from_value(value).map_err(|err| format!("invalid subtask: {err}"))?;
    let errors = validate_subtask_invariants(&subtasks);
    if !errors.is_empty() {
        return Err(errors.join("; "));
    }
    Ok(subtasks)
}

/// Invariants not expressible in the schema: numbers are unique.
pub fn validate_subtask_invariants(subtasks: &[Subtask]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for subtask in subtasks {
        if !seen.insert(subtask.number) {
            errors.push(format!("duplicate subtask number {}", subtask.number));
        }
    }
    errors
}

fn validate_schema(instance: &Value) -> Result<(), String> {
    let schema: Value =
        serde_json::from_str(SUBTASKS_SCHEMA).expect("embedded subtasks schema should be valid");
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile subtasks schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}
