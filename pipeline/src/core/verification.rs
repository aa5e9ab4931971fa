//! Classification of test-file runs into RED/GREEN verification reports.
//!
//! Running the files is I/O (`io::verify`); deciding what a batch of per-file
//! outcomes means is pure and lives here.

use serde::{Deserialize, Serialize};

/// Which outcome the caller expects from the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Freshly authored tests must all fail.
    Red,
    /// Implemented tests must all pass.
    Green,
}

impl Expectation {
    pub fn as_str(self) -> &'static str {
        match self {
            Expectation::Red => "red",
            Expectation::Green => "green",
        }
    }
}

/// Outcome of running one test file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Exit code 0.
    Passed,
    /// Non-zero exit code.
    Failed,
    /// The per-file timeout expired.
    TimedOut,
    /// The test command could not be launched for this file.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub file: String,
    pub outcome: FileOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FileResult {
    pub fn passed(file: impl Into<String>) -> Self {
        Self::new(file, FileOutcome::Passed, Some(0), None)
    }

    pub fn failed(file: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::new(file, FileOutcome::Failed, exit_code, None)
    }

    pub fn timed_out(file: impl Into<String>) -> Self {
        Self::new(file, FileOutcome::TimedOut, None, None)
    }

    pub fn error(file: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(file, FileOutcome::Error, None, Some(detail.into()))
    }

    fn new(
        file: impl Into<String>,
        outcome: FileOutcome,
        exit_code: Option<i32>,
        detail: Option<String>,
    ) -> Self {
        Self {
            file: file.into(),
            outcome,
            exit_code,
            detail,
        }
    }
}

/// Aggregate verdict over a bounded batch of test files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified: bool,
    pub skipped: bool,
    pub reason: String,
    #[serde(default)]
    pub results: Vec<FileResult>,
}

impl VerificationReport {
    /// The batch could not be run at all; this is "unverifiable", not a failure.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            skipped: true,
            reason: reason.into(),
            results: Vec::new(),
        }
    }
}

/// Classify per-file results against `expectation`.
///
/// - No results, or every file failed to launch: `skipped`.
/// - RED: verified iff every file failed or timed out. A pass or a launch
///   error invalidates the batch.
/// - GREEN: verified iff every file passed.
pub fn classify(expectation: Expectation, results: Vec<FileResult>) -> VerificationReport {
    if results.is_empty() {
        return VerificationReport::skipped("no test files found");
    }
    if results.iter().all(|r| r.outcome == FileOutcome::Error) {
        let detail = results
            .iter()
            .find_map(|r| r.detail.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        return VerificationReport {
            verified: false,
            skipped: true,
            reason: format!("test runner unavailable: {detail}"),
            results,
        };
    }

    let total = results.len();
    let count = |outcome: FileOutcome| results.iter().filter(|r| r.outcome == outcome).count();
    let passed = count(FileOutcome::Passed);
    let errored = count(FileOutcome::Error);

    let (verified, reason) = match expectation {
        Expectation::Red => {
            if passed == 0 && errored == 0 {
                (true, "all tests fail as expected".to_string())
            } else if passed > 0 {
                (
                    false,
                    format!("{passed} of {total} test files passed unexpectedly"),
                )
            } else {
                (false, format!("{errored} of {total} test files could not run"))
            }
        }
        Expectation::Green => {
            if passed == total {
                (true, "all tests pass".to_string())
            } else {
                (false, format!("{} of {total} test files did not pass", total - passed))
            }
        }
    };

    VerificationReport {
        verified,
        skipped: false,
        reason,
        results,
    }
}
