//! I/O adapters for the pipeline.

pub mod artifacts;
pub mod config;
pub mod gates;
pub mod issue;
pub mod process;
pub mod prompt;
pub mod task_store;
pub mod verify;
pub mod worker;
pub mod worker_def;
