//! Diagnostics for pipeline runs.
//!
//! - **Tracing (this module)**: progress and diagnostics on stderr, filtered
//!   by `RUST_LOG`.
//! - **Task directory**: `task.json`, artifacts and per-worker `worker.log`
//!   files. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "task_pipeline=info,warn";
const VERBOSE_FILTER: &str = "task_pipeline=debug,info";

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks debug or info for this
/// crate.
///
/// ```bash
/// RUST_LOG=task_pipeline=trace task-pipeline run --task tasks/00048-agent-init
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
