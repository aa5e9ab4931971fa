//! Helpers for running child processes with timeouts and bounded output.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            // A child that exits without reading stdin closes the pipe early.
            Some(thread::spawn(move || match child_stdin.write_all(&input) {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                    warn!(err = %e, "failed to write child stdin");
                }
                _ => {}
            }))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle
        && handle.join().is_err()
    {
        return Err(anyhow!("stdin writer thread panicked"));
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// A fully described child process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub stdin: Option<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommandSpec {
    pub fn new(
        program: impl Into<String>,
        workdir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            stdin: None,
            timeout,
            output_limit_bytes,
        }
    }

    /// Build from an argv array (`["npx", "vitest", "run"]`).
    pub fn from_argv(
        argv: &[String],
        workdir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("command must be a non-empty array"))?;
        Ok(
            Self::new(program.clone(), workdir, timeout, output_limit_bytes)
                .args(args.iter().cloned()),
        )
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Outcome of a [`CommandSpec`] run. Spawn failures other than "not found"
/// surface as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
        truncated_bytes: usize,
    },
    TimedOut {
        stdout: String,
        stderr: String,
    },
    /// The program (or the working directory) does not exist.
    NotFound { program: String },
}

impl CommandOutcome {
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        CommandOutcome::Exited {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
            truncated_bytes: 0,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, CommandOutcome::Exited { code: Some(0), .. })
    }

    /// Human-readable log with stdout/stderr sections, bounded to `limit` bytes.
    pub fn render_log(&self, header: &str, limit: usize) -> String {
        let mut buf = String::new();
        buf.push_str(header);
        buf.push('\n');
        match self {
            CommandOutcome::Exited {
                code,
                stdout,
                stderr,
                truncated_bytes,
            } => {
                push_streams(&mut buf, stdout, stderr);
                if *truncated_bytes > 0 {
                    buf.push_str(&format!("\n[output truncated {truncated_bytes} bytes]\n"));
                }
                buf.push_str(&format!("\n[exit code {code:?}]\n"));
            }
            CommandOutcome::TimedOut { stdout, stderr } => {
                push_streams(&mut buf, stdout, stderr);
                buf.push_str("\n[timed out]\n");
            }
            CommandOutcome::NotFound { program } => {
                buf.push_str(&format!("[not found: {program}]\n"));
            }
        }
        bound_log(buf, limit)
    }
}

fn push_streams(buf: &mut String, stdout: &str, stderr: &str) {
    buf.push_str("=== stdout ===\n");
    buf.push_str(stdout);
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(stderr);
}

fn bound_log(buf: String, limit: usize) -> String {
    if buf.len() <= limit {
        return buf;
    }
    let mut cut = limit;
    while cut > 0 && !buf.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n[truncated {} bytes]\n", &buf[..cut], buf.len() - cut)
}

/// Write a command log, creating parent directories.
pub fn write_command_log(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write log {}", path.display()))
}

/// Seam for every non-worker child process (verification, gates, issue intake).
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;
}

/// Runs commands on the host.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %spec.program))]
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        if !spec.workdir.is_dir() {
            warn!(workdir = %spec.workdir.display(), "working directory missing");
            return Ok(CommandOutcome::NotFound {
                program: format!("{} (missing directory {})", spec.program, spec.workdir.display()),
            });
        }
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).current_dir(&spec.workdir);

        let output = match run_command_with_timeout(
            cmd,
            spec.stdin.as_deref().map(str::as_bytes),
            spec.timeout,
            spec.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => {
                return Ok(CommandOutcome::NotFound {
                    program: spec.program.clone(),
                });
            }
            Err(err) => return Err(err).with_context(|| format!("run {}", spec.display())),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.timed_out {
            return Ok(CommandOutcome::TimedOut { stdout, stderr });
        }
        Ok(CommandOutcome::Exited {
            code: output.status.code(),
            stdout,
            stderr,
            truncated_bytes: output.stdout_truncated + output.stderr_truncated,
        })
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
    })
}
