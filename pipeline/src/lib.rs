//! Resumable multi-phase task pipeline.
//!
//! A task runs through analysis, planning, one test-then-implement cycle per
//! planned subtask, an integration gate and a smoke gate. Every phase is an
//! external worker process or test command; progress is persisted in the task
//! directory so an interrupted run resumes where it stopped.
//!
//! - **[`core`]**: Pure, deterministic logic (status model, artifact parsing,
//!   verification classification, cycle transitions, failure threshold).
//! - **[`io`]**: Side-effecting operations (processes, config, task store,
//!   prompts). Behind traits where tests need fakes.
//!
//! [`agents`] wraps each worker role, [`cycle`] runs one subtask, and
//! [`pipeline`] sequences the phases.

pub mod agents;
pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
