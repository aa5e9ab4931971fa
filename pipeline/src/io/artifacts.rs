//! Artifact persistence inside a phase directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::artifacts::artifact_relative_path;
use crate::core::types::Artifacts;

/// Write every artifact under `dir`, creating parent directories as needed.
///
/// Names that would escape `dir` are skipped with a warning. Existing files are
/// overwritten, so saving the same artifacts twice is idempotent.
pub fn save_artifacts(dir: &Path, artifacts: &Artifacts) -> Result<Vec<String>> {
    fs::create_dir_all(dir).with_context(|| format!("create artifact dir {}", dir.display()))?;
    let mut saved = Vec::with_capacity(artifacts.len());
    for (name, content) in artifacts {
        let Some(relative) = artifact_relative_path(name) else {
            warn!(artifact = %name, "skipping artifact with unsafe name");
            continue;
        };
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create artifact dir {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write artifact {}", path.display()))?;
        debug!(path = %path.display(), "saved artifact");
        saved.push(name.clone());
    }
    Ok(saved)
}

/// Read one artifact back, `None` if it was never written.
pub fn read_artifact(dir: &Path, name: &str) -> Result<Option<String>> {
    let Some(relative) = artifact_relative_path(name) else {
        return Ok(None);
    };
    let path = dir.join(relative);
    if !path.is_file() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read artifact {}", path.display()))?;
    Ok(Some(contents))
}

/// Delete artifacts left by an earlier attempt. Missing files are fine.
pub fn remove_artifacts(dir: &Path, names: &[&str]) -> Result<()> {
    for name in names {
        let Some(relative) = artifact_relative_path(name) else {
            continue;
        };
        let path = dir.join(relative);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale artifact"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove artifact {}", path.display()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_nested_names_and_skips_escapes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tdd");
        let mut artifacts = Artifacts::new();
        artifacts.insert("test-spec.md".to_string(), "spec".to_string());
        artifacts.insert("tests/unit/a.test.sh".to_string(), "exit 1".to_string());
        artifacts.insert("../evil.md".to_string(), "nope".to_string());

        let saved = save_artifacts(&dir, &artifacts).expect("save");
        assert_eq!(saved, vec!["test-spec.md", "tests/unit/a.test.sh"]);
        assert_eq!(
            fs::read_to_string(dir.join("tests/unit/a.test.sh")).expect("read"),
            "exit 1"
        );
        assert!(!temp.path().join("evil.md").exists());

        save_artifacts(&dir, &artifacts).expect("save again");
        assert_eq!(
            read_artifact(&dir, "test-spec.md").expect("read"),
            Some("spec".to_string())
        );
        assert_eq!(read_artifact(&dir, "missing.md").expect("read"), None);
    }

    #[test]
    fn remove_deletes_listed_and_ignores_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("plan.md"), "old").expect("write");
        fs::write(temp.path().join("keep.md"), "keep").expect("write");

        remove_artifacts(temp.path(), &["plan.md", "subtasks.json"]).expect("remove");
        assert!(!temp.path().join("plan.md").exists());
        assert!(temp.path().join("keep.md").is_file());
    }
}
