//! Failure threshold gate for the subtask loop.

/// Halts the subtask loop once accumulated failures reach the limit.
///
/// A limit of `0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureGate {
    max_failures: u32,
}

impl FailureGate {
    pub fn new(max_failures: u32) -> Self {
        Self { max_failures }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn is_tripped(&self, failure_count: u32) -> bool {
        self.max_failures > 0 && failure_count >= self.max_failures
    }
}
