//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifacts;
pub mod cycle_state;
pub mod gates;
pub mod metadata;
pub mod subtasks;
pub mod threshold;
pub mod types;
pub mod verification;
