//! Artifact extraction from worker output and artifact size caps.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Artifacts, Signal, SignalKind};

static ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<artifact name="([^"]+)">\s*(.*?)\s*</artifact>"#)
        .expect("artifact pattern should be valid")
});

/// Extract `<artifact name="X">…</artifact>` blocks from `output`.
///
/// Always returns at least one artifact: when no delimited block is present the
/// whole output is stored under `default_name`. A repeated name keeps the last
/// block.
pub fn extract_artifacts(output: &str, default_name: &str) -> Artifacts {
    let mut artifacts: Artifacts = ARTIFACT_RE
        .captures_iter(output)
        .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect();
    if artifacts.is_empty() {
        artifacts.insert(default_name.to_string(), output.to_string());
    }
    artifacts
}

/// Truncate `name` to `max_lines`, appending an explicit truncation marker.
///
/// Returns a soft signal when truncation happened.
pub fn cap_artifact_lines(
    artifacts: &mut Artifacts,
    name: &str,
    max_lines: usize,
    hint: &str,
) -> Option<Signal> {
    let content = artifacts.get(name)?;
    let (capped, original_lines) = cap_lines(content, max_lines, hint)?;
    artifacts.insert(name.to_string(), capped);
    Some(Signal::new(
        SignalKind::ArtifactTruncated,
        format!("{name} has {original_lines} lines (max {max_lines}); truncated"),
    ))
}

/// Keep the first `max_lines` lines of `content` followed by a marker line.
///
/// Returns `None` if `content` already fits.
pub fn cap_lines(content: &str, max_lines: usize, hint: &str) -> Option<(String, usize)> {
    let lines: Vec<&str> = content.split('\n').collect();
    let original = lines.len();
    if original <= max_lines {
        return None;
    }
    let mut kept: Vec<&str> = lines[..max_lines].to_vec();
    kept.push("");
    let marker = if hint.is_empty() {
        format!("[TRUNCATED: Original was {original} lines.]")
    } else {
        format!("[TRUNCATED: Original was {original} lines. {hint}]")
    };
    let mut capped = kept.join("\n");
    capped.push('\n');
    capped.push_str(&marker);
    Some((capped, original))
}

/// Validate an artifact name as a relative path that stays inside its directory.
///
/// Rejects empty names, absolute paths, and any `..` component.
pub fn artifact_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(out)
}
