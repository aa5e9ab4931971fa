//! Task intake: fetching issue text and naming task directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tracing::info;

use crate::io::process::{CommandOutcome, CommandRunner, CommandSpec};

const MAX_SLUG_CHARS: usize = 50;
const UNTITLED: &str = "untitled";
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

static NON_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("slug pattern should be valid"));
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("separator pattern should be valid"));
static DASHES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+").expect("dash pattern should be valid"));

/// Fetch an issue body with `gh issue view`.
pub fn fetch_issue<R: CommandRunner + ?Sized>(
    runner: &R,
    number: u32,
    repo: Option<&str>,
    workdir: &Path,
    output_limit_bytes: usize,
) -> Result<String> {
    let mut spec = CommandSpec::new("gh", workdir, FETCH_TIMEOUT, output_limit_bytes)
        .arg("issue")
        .arg("view")
        .arg(number.to_string());
    if let Some(repo) = repo {
        spec = spec.arg("--repo").arg(repo);
    }
    info!(command = %spec.display(), "fetching issue");
    match runner.run(&spec)? {
        CommandOutcome::Exited {
            code: Some(0),
            stdout,
            ..
        } => Ok(stdout),
        CommandOutcome::Exited { code, stderr, .. } => Err(anyhow!(
            "failed to fetch issue #{number} (exit {code:?}): {}",
            stderr.trim()
        )),
        CommandOutcome::TimedOut { .. } => bail!("fetching issue #{number} timed out"),
        CommandOutcome::NotFound { program } => {
            bail!("{program} not found; install the GitHub CLI to use --issue")
        }
    }
}

/// Title from the `title:` line of `gh issue view` output.
pub fn extract_title(issue: &str) -> String {
    issue
        .lines()
        .find_map(|line| line.strip_prefix("title:"))
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNTITLED)
        .to_string()
}

/// Lowercase, punctuation dropped, whitespace and underscores collapsed to `-`,
/// capped at 50 characters.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let cleaned = NON_SLUG_RE.replace_all(&lower, "");
    let dashed = SEPARATOR_RE.replace_all(&cleaned, "-");
    let collapsed = DASHES_RE.replace_all(&dashed, "-");
    collapsed
        .trim_matches('-')
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect()
}

/// `<NNNNN>-<slug>`.
pub fn task_dir_name(number: u32, slug: &str) -> String {
    format!("{number:05}-{slug}")
}

/// Create (or reuse) the task directory for `number` under `tasks_dir`.
pub fn create_task_dir(tasks_dir: &Path, number: u32, slug: &str) -> Result<PathBuf> {
    let dir = tasks_dir.join(task_dir_name(number, slug));
    fs::create_dir_all(&dir).with_context(|| format!("create task dir {}", dir.display()))?;
    Ok(dir)
}

/// Pseudo issue number for file-based tasks.
pub fn pseudo_issue_number(unix_secs: i64) -> u32 {
    u32::try_from(unix_secs.rem_euclid(100_000)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    #[test]
    fn slugify_matches_naming_rules() {
        assert_eq!(slugify("Agent Init: Overhaul!"), "agent-init-overhaul");
        assert_eq!(slugify("  snake_case  and--dashes "), "snake-case-and-dashes");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(&"word ".repeat(30)).chars().count(), 50);
    }

    #[test]
    fn title_comes_from_title_line() {
        let issue = "title:\tSupport multi-version artifacts\nstate:\tOPEN\n--\nbody";
        assert_eq!(extract_title(issue), "Support multi-version artifacts");
        assert_eq!(extract_title("no header"), "untitled");
    }

    #[test]
    fn task_dir_is_zero_padded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = create_task_dir(temp.path(), 48, "agent-init").expect("create");
        assert_eq!(dir, temp.path().join("00048-agent-init"));
        assert!(dir.is_dir());
        assert_eq!(pseudo_issue_number(1_700_012_345), 12_345);
    }

    #[test]
    fn fetch_passes_repo_and_reports_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(vec![CommandOutcome::exited(0, "title:\tX\n")]);
        let body = fetch_issue(&runner, 7, Some("acme/app"), temp.path(), 1_000).expect("fetch");
        assert_eq!(body, "title:\tX\n");
        assert_eq!(
            runner.calls()[0].args,
            vec!["issue", "view", "7", "--repo", "acme/app"]
        );

        let runner = ScriptedRunner::new(vec![CommandOutcome::NotFound {
            program: "gh".to_string(),
        }]);
        let err = fetch_issue(&runner, 7, None, temp.path(), 1_000).expect_err("missing gh");
        assert!(err.to_string().contains("gh not found"));
    }
}
