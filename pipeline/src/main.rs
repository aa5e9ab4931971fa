//! Task pipeline CLI.
//!
//! `run` drives a task directory through analysis, planning, subtask cycles and
//! the validation gates; `status` prints what a task directory has recorded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};

use task_pipeline::core::metadata::TaskMetadata;
use task_pipeline::core::types::TaskType;
use task_pipeline::exit_codes;
use task_pipeline::io::config::{PipelineConfig, default_config_path, load_config};
use task_pipeline::io::issue::{
    create_task_dir, extract_title, fetch_issue, pseudo_issue_number, slugify,
};
use task_pipeline::io::process::SystemRunner;
use task_pipeline::io::task_store::TaskStore;
use task_pipeline::io::worker::ClaudeWorker;
use task_pipeline::logging;
use task_pipeline::pipeline::{
    PhaseSelection, PipelineRequest, PipelineStop, PipelineSummary, run_pipeline,
};

const FALLBACK_SLUG: &str = "task";

#[derive(Parser)]
#[command(
    name = "task-pipeline",
    version,
    about = "Resumable analysis, planning and test-first implementation pipeline"
)]
struct Cli {
    /// Debug-level diagnostics (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run (or resume) a task.
    Run(RunArgs),
    /// Print the recorded state of a task directory.
    Status {
        /// Task directory containing task.json.
        #[arg(long)]
        task: PathBuf,
        /// Print the raw metadata as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("input").required(true).args(["issue", "task", "file"]))]
struct RunArgs {
    /// GitHub issue number to fetch with `gh`.
    #[arg(long)]
    issue: Option<u32>,
    /// Repository for --issue (OWNER/REPO).
    #[arg(long, requires = "issue")]
    repo: Option<String>,
    /// Existing task directory containing issue.md.
    #[arg(long)]
    task: Option<PathBuf>,
    /// Markdown file holding the task text.
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = TaskTypeArg::App)]
    task_type: TaskTypeArg,
    #[arg(long, value_enum, default_value_t = PhaseArg::All)]
    phase: PhaseArg,
    /// Defaults to the current directory.
    #[arg(long)]
    project_root: Option<PathBuf>,
    /// Where new task directories are created (default from config).
    #[arg(long)]
    tasks_dir: Option<PathBuf>,
    /// Failed subtasks tolerated before aborting (0 = unlimited).
    #[arg(long)]
    max_failures: Option<u32>,
    /// Defaults to <project-root>/.task-pipeline/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum TaskTypeArg {
    App,
    Infrastructure,
}

impl From<TaskTypeArg> for TaskType {
    fn from(arg: TaskTypeArg) -> Self {
        match arg {
            TaskTypeArg::App => TaskType::App,
            TaskTypeArg::Infrastructure => TaskType::Infrastructure,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    Architect,
    Planner,
    All,
}

impl From<PhaseArg> for PhaseSelection {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Architect => PhaseSelection::Architect,
            PhaseArg::Planner => PhaseSelection::Planner,
            PhaseArg::All => PhaseSelection::All,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Status { task, json } => cmd_status(&task, json),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let project_root = match &args.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    if !project_root.is_dir() {
        bail!("project root {} is not a directory", project_root.display());
    }
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&project_root));
    let config = load_config(&config_path)?;

    let (task_dir, issue) = resolve_input(&args, &project_root, &config)?;
    let request = PipelineRequest {
        project_root,
        task_dir,
        issue,
        task_type: args.task_type.into(),
        phase: args.phase.into(),
        max_failures: args.max_failures,
    };
    let worker = ClaudeWorker::new(config.worker_program.clone());
    let summary = run_pipeline(&request, &config, &worker, &SystemRunner)?;
    print_summary(&summary, args.json)?;
    Ok(exit_codes::for_stop(&summary.stop))
}

/// Task directory and task text for the selected input.
fn resolve_input(
    args: &RunArgs,
    project_root: &Path,
    config: &PipelineConfig,
) -> Result<(PathBuf, String)> {
    let tasks_dir = project_root.join(args.tasks_dir.as_ref().unwrap_or(&config.tasks_dir));

    if let Some(number) = args.issue {
        let issue = fetch_issue(
            &SystemRunner,
            number,
            args.repo.as_deref(),
            project_root,
            config.output_limit_bytes,
        )?;
        let slug = non_empty_slug(&extract_title(&issue));
        return Ok((create_task_dir(&tasks_dir, number, &slug)?, issue));
    }

    if let Some(task) = &args.task {
        let store = TaskStore::new(task);
        if !task.is_dir() || !store.paths().issue().is_file() {
            bail!("task directory {} must contain issue.md", task.display());
        }
        return Ok((task.clone(), store.read_issue()?));
    }

    if let Some(file) = &args.file {
        let issue =
            fs::read_to_string(file).with_context(|| format!("read task file {}", file.display()))?;
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let number = pseudo_issue_number(Utc::now().timestamp());
        let task_dir = create_task_dir(&tasks_dir, number, &non_empty_slug(&stem))?;
        return Ok((task_dir, issue));
    }

    bail!("one of --issue, --task or --file is required")
}

fn non_empty_slug(text: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

fn cmd_status(task: &Path, json: bool) -> Result<i32> {
    let store = TaskStore::new(task);
    let Some(meta) = store.load()? else {
        bail!("no task.json in {}", task.display());
    };
    if json {
        let mut payload = serde_json::to_string_pretty(&meta).context("serialize task metadata")?;
        payload.push('\n');
        print!("{payload}");
        return Ok(exit_codes::OK);
    }
    print_metadata(task, &meta);
    Ok(exit_codes::OK)
}

fn print_summary(summary: &PipelineSummary, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(summary).context("serialize summary")?;
        println!("{payload}");
        return Ok(());
    }
    println!("task: {}", summary.task_dir.display());
    println!("status: {}", summary.status);
    println!(
        "subtasks: {} complete, {} failed",
        summary.subtasks_completed, summary.subtasks_failed
    );
    for failed in &summary.failed_subtasks {
        println!("  failed {}: {} ({})", failed.index, failed.title, failed.reason);
    }
    match &summary.stop {
        PipelineStop::Complete => {}
        PipelineStop::Paused { after } => println!("paused after {after}"),
        stop => {
            if let Some(signal) = stop.signal() {
                println!("stopped: {}", signal.message);
            }
        }
    }
    Ok(())
}

fn print_metadata(task: &Path, meta: &TaskMetadata) {
    println!("task: {}", task.display());
    println!("status: {}", meta.status);
    println!("type: {}", meta.task_type);
    println!("failures: {}/{}", meta.failure_count, meta.max_failures);
    for record in &meta.phases_completed {
        let title = record
            .title
            .as_deref()
            .map(|t| format!(" {t}"))
            .unwrap_or_default();
        let reason = record
            .reason
            .as_deref()
            .map(|r| format!(" - {r}"))
            .unwrap_or_default();
        println!(
            "  {} [{}]{title}{reason}",
            record.phase,
            record.status
        );
    }
}
