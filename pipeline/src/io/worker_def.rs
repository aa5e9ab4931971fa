//! Worker definitions under `.claude/agents/<name>.md`.
//!
//! A definition is a YAML front-matter block followed by the instruction body:
//!
//! ```text
//! ---
//! name: tdd-developer
//! description: Writes failing tests, then makes them pass
//! tools: Read, Write, Bash
//! model: sonnet
//! ---
//! You are ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

pub const DEFAULT_MODEL: &str = "sonnet";
const DEFINITIONS_DIR: &str = ".claude/agents";

/// A parsed worker definition. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDefinition {
    pub name: String,
    pub description: String,
    pub tools: Vec<String>,
    pub model: String,
    pub instructions: String,
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tools: Option<ToolList>,
    #[serde(default)]
    model: Option<String>,
}

/// `tools` is usually a comma-separated string but a YAML list is accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolList {
    Csv(String),
    List(Vec<String>),
}

impl ToolList {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            ToolList::Csv(raw) => raw.split(',').map(str::to_string).collect(),
            ToolList::List(items) => items,
        };
        items
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Path of the definition named `name` under `project_root`.
pub fn definition_path(project_root: &Path, name: &str) -> PathBuf {
    project_root.join(DEFINITIONS_DIR).join(format!("{name}.md"))
}

/// Load the definition named `name`.
pub fn load_definition(project_root: &Path, name: &str) -> Result<WorkerDefinition> {
    let path = definition_path(project_root, name);
    if !path.exists() {
        return Err(anyhow!("worker definition not found: {}", path.display()));
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("read worker definition {}", path.display()))?;
    parse_definition(&contents, name)
        .with_context(|| format!("parse worker definition {}", path.display()))
}

/// Parse a definition document. `fallback_name` is used when the front matter
/// has no `name`.
pub fn parse_definition(contents: &str, fallback_name: &str) -> Result<WorkerDefinition> {
    let (front, body) = split_front_matter(contents);
    let front: FrontMatter = match front {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).context("invalid front matter")?
        }
        _ => FrontMatter::default(),
    };
    Ok(WorkerDefinition {
        name: front
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string()),
        description: front.description.unwrap_or_default(),
        tools: front.tools.map(ToolList::into_vec).unwrap_or_default(),
        model: front
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        instructions: body.trim().to_string(),
    })
}

fn split_front_matter(contents: &str) -> (Option<&str>, &str) {
    let Some(rest) = contents.strip_prefix("---") else {
        return (None, contents);
    };
    let rest = rest.trim_start_matches([' ', '\t']);
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return (None, contents);
    };
    if let Some(body) = rest.strip_prefix("---") {
        return (Some(""), body);
    }
    match rest.find("\n---") {
        Some(end) => {
            let yaml = &rest[..end];
            let after = &rest[end + 4..];
            let body = after.split_once('\n').map_or("", |(_, body)| body);
            (Some(yaml), body)
        }
        None => (None, contents),
    }
}
