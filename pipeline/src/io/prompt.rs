//! Prompt builder for worker input.
//!
//! Templates are split into sections with `<!-- section:KEY required|droppable -->`
//! markers. When a rendered prompt exceeds the byte budget, droppable sections
//! are removed first, then the largest remaining section is truncated.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Subtask, TaskType};

const ARCHITECT_TEMPLATE: &str = include_str!("prompts/architect.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const TDD_TEMPLATE: &str = include_str!("prompts/tdd.md");
const EXECUTOR_TEMPLATE: &str = include_str!("prompts/executor.md");

/// Drop order when over budget.
const DROP_ORDER: [&str; 2] = ["reference", "test_spec"];
const TRUNCATION_MARKER: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker pattern should be valid")
});

#[derive(Debug, Clone, Serialize)]
struct SubtaskContext {
    number: u32,
    title: String,
    description: String,
    files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ReferenceContext {
    path: String,
    reason: Option<String>,
}

impl SubtaskContext {
    fn from_subtask(subtask: &Subtask) -> Self {
        Self {
            number: subtask.number,
            title: subtask.title.trim().to_string(),
            description: subtask.description.trim().to_string(),
            files: subtask.files.clone(),
        }
    }
}

fn references(subtask: &Subtask) -> Vec<ReferenceContext> {
    subtask
        .reference_files
        .iter()
        .map(|r| ReferenceContext {
            path: r.path.clone(),
            reason: r.reason.clone().filter(|s| !s.trim().is_empty()),
        })
        .collect()
}

/// Conventional path of the test file the test author is asked for.
pub fn conventional_test_path(number: u32, task_type: TaskType) -> String {
    format!("tests/subtask-{number:02}{}", task_type.test_extension())
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("architect", ARCHITECT_TEMPLATE),
            ("planner", PLANNER_TEMPLATE),
            ("tdd", TDD_TEMPLATE),
            ("executor", EXECUTOR_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on section markers. Empty droppable sections vanish.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Enforce the byte budget: drop droppable sections, then truncate the largest.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    if total_len(sections) <= budget {
        return;
    }

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let excess = total - budget;
    let before_len = largest.content.len();
    let mut keep = before_len
        .saturating_sub(excess)
        .saturating_sub(TRUNCATION_MARKER.len());
    while keep > 0 && !largest.content.is_char_boundary(keep) {
        keep -= 1;
    }
    largest.content.truncate(keep);
    largest.content.push_str(TRUNCATION_MARKER);
    debug!(
        section = %largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds worker prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Prompt for the analysis phase: the raw task text.
    pub fn build_architect(&self, issue: &str) -> Result<String> {
        self.build("architect", context! { issue => issue.trim() })
    }

    /// Prompt for the planning phase: the analysis artifact.
    pub fn build_planner(&self, analysis: &str) -> Result<String> {
        self.build("planner", context! { analysis => analysis.trim() })
    }

    /// Prompt for the test author of one subtask.
    pub fn build_tdd(
        &self,
        subtask: &Subtask,
        task_type: TaskType,
        max_spec_lines: usize,
    ) -> Result<String> {
        self.build(
            "tdd",
            context! {
                subtask => SubtaskContext::from_subtask(subtask),
                reference_files => references(subtask),
                test_extension => task_type.test_extension(),
                test_path => conventional_test_path(subtask.number, task_type),
                max_spec_lines => max_spec_lines,
            },
        )
    }

    /// Prompt for the implementer of one subtask.
    pub fn build_executor(
        &self,
        subtask: &Subtask,
        tests_dir: &str,
        test_spec: Option<&str>,
        max_notes_lines: usize,
    ) -> Result<String> {
        self.build(
            "executor",
            context! {
                subtask => SubtaskContext::from_subtask(subtask),
                reference_files => references(subtask),
                tests_dir => tests_dir,
                test_spec => test_spec.map(str::trim).filter(|s| !s.is_empty()),
                max_notes_lines => max_notes_lines,
            },
        )
    }

    fn build(&self, template: &str, ctx: minijinja::Value) -> Result<String> {
        let rendered = PromptEngine::new().render(template, ctx)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
