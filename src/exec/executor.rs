// src/exec/executor.rs

//! Runs a single [`TaskSpec`] to completion, applying its retry policy.
//!
//! Every attempt spawns a fresh OS process; nothing is carried over between
//! separate `run` calls. Failures inside an attempt are
//! [`TaskExecutionError`]s that feed the retry loop and end up as the
//! `error` of a `FAILED` [`TaskResult`]; they never escape the executor.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::task::{TaskCommand, TaskSpec};
use crate::report::TaskResult;
use crate::types::{TaskId, TaskStatus};

/// Exit code recorded when the process could not be launched at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// Variables injected into every attempt (the task's own `env` wins).
pub const TASK_ID_ENV: &str = "DAGRUN_TASK_ID";
pub const ATTEMPT_ENV: &str = "DAGRUN_ATTEMPT";

/// Captured output is trimmed from the front beyond this size.
const MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// How long to wait for output readers after the process is gone.
///
/// A background grandchild can keep a pipe open forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a single attempt did not succeed.
#[derive(Error, Debug)]
pub enum TaskExecutionError {
    #[error("failed to launch process: {0}")]
    Spawn(#[source] io::Error),

    #[error("process exited with code {0}")]
    NonZeroExit(i32),

    #[error("process terminated without an exit code (killed by a signal)")]
    Terminated,

    #[error("failed to wait for process: {0}")]
    Wait(#[source] io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Outcome of one process invocation.
struct Attempt {
    result: Result<(), TaskExecutionError>,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl Attempt {
    fn without_process(err: TaskExecutionError, exit_code: Option<i32>) -> Self {
        Self {
            result: Err(err),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn cancelled(&self) -> bool {
        matches!(self.result, Err(TaskExecutionError::Cancelled))
    }
}

/// Spawns task processes.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    /// Directory for tasks without their own `working_dir`; also the base
    /// for relative task directories.
    working_dir: Option<PathBuf>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }

    /// Run `spec` until it succeeds or its attempts are exhausted.
    pub async fn run(&self, spec: &TaskSpec) -> TaskResult {
        self.run_cancellable(spec, CancellationToken::new()).await
    }

    /// Like [`Executor::run`], but `cancel` kills the running process (best
    /// effort) or interrupts the retry delay. A cancelled run yields a
    /// `FAILED` result with `cancelled = true`.
    pub async fn run_cancellable(&self, spec: &TaskSpec, cancel: CancellationToken) -> TaskResult {
        let started_at = Utc::now();
        let max_attempts = spec.retry.max_attempts.max(1);
        let mut attempts = 0;

        let last = loop {
            if cancel.is_cancelled() {
                break Attempt::without_process(TaskExecutionError::Cancelled, None);
            }

            attempts += 1;
            let attempt = self.attempt(spec, attempts, &cancel).await;

            if attempt.result.is_ok() || attempt.cancelled() {
                break attempt;
            }
            let err = match &attempt.result {
                Err(err) => err.to_string(),
                Ok(()) => String::new(),
            };

            if attempts >= max_attempts {
                warn!(
                    task = %spec.id,
                    attempts,
                    error = %err,
                    "task failed; no attempts left"
                );
                break attempt;
            }

            warn!(
                task = %spec.id,
                attempt = attempts,
                max_attempts,
                error = %err,
                delay_ms = spec.retry.delay.as_millis() as u64,
                "attempt failed; retrying after delay"
            );

            tokio::select! {
                _ = tokio::time::sleep(spec.retry.delay) => {}
                _ = cancel.cancelled() => {
                    info!(task = %spec.id, "cancelled during retry delay");
                    break Attempt {
                        result: Err(TaskExecutionError::Cancelled),
                        ..attempt
                    };
                }
            }
        };

        let cancelled = last.cancelled();
        let (status, error) = match last.result {
            Ok(()) => (TaskStatus::Success, None),
            Err(err) => (TaskStatus::Failed, Some(err.to_string())),
        };

        TaskResult {
            task_id: spec.id.clone(),
            status,
            attempts,
            exit_code: last.exit_code,
            started_at,
            finished_at: Utc::now(),
            error,
            cancelled,
            stdout: last.stdout,
            stderr: last.stderr,
        }
    }

    /// Spawn the process once and wait for it (or for cancellation).
    async fn attempt(&self, spec: &TaskSpec, attempt: u32, cancel: &CancellationToken) -> Attempt {
        let mut cmd = match build_command(&spec.command) {
            Ok(cmd) => cmd,
            Err(e) => {
                return Attempt::without_process(
                    TaskExecutionError::Spawn(e),
                    Some(LAUNCH_FAILURE_EXIT_CODE),
                );
            }
        };

        cmd.env(TASK_ID_ENV, &spec.id)
            .env(ATTEMPT_ENV, attempt.to_string())
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = self.working_dir_for(spec) {
            cmd.current_dir(dir);
        }

        info!(
            task = %spec.id,
            attempt,
            cmd = %spec.command,
            "starting task process"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(task = %spec.id, attempt, error = %e, "failed to launch task process");
                return Attempt::without_process(
                    TaskExecutionError::Spawn(e),
                    Some(LAUNCH_FAILURE_EXIT_CODE),
                );
            }
        };

        let stdout = child
            .stdout
            .take()
            .map(|s| OutputCapture::spawn(s, spec.id.clone(), "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|s| OutputCapture::spawn(s, spec.id.clone(), "stderr"));

        let (result, exit_code) = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    let code = status.code();
                    info!(
                        task = %spec.id,
                        attempt,
                        exit_code = code,
                        success = status.success(),
                        "task process exited"
                    );
                    match code {
                        Some(0) => (Ok(()), code),
                        Some(c) => (Err(TaskExecutionError::NonZeroExit(c)), code),
                        None => (Err(TaskExecutionError::Terminated), None),
                    }
                }
                Err(e) => (Err(TaskExecutionError::Wait(e)), None),
            },

            _ = cancel.cancelled() => {
                info!(
                    task = %spec.id,
                    attempt,
                    "cancellation requested for running task; killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(
                        task = %spec.id,
                        error = %e,
                        "failed to kill child process on cancellation"
                    );
                }
                (Err(TaskExecutionError::Cancelled), None)
            }
        };

        let stdout = match stdout {
            Some(capture) => capture.finish().await,
            None => String::new(),
        };
        let stderr = match stderr {
            Some(capture) => capture.finish().await,
            None => String::new(),
        };

        Attempt {
            result,
            exit_code,
            stdout,
            stderr,
        }
    }

    fn working_dir_for(&self, spec: &TaskSpec) -> Option<PathBuf> {
        match (&spec.working_dir, &self.working_dir) {
            (Some(dir), Some(base)) if dir.is_relative() => Some(base.join(dir)),
            (Some(dir), _) => Some(dir.clone()),
            (None, base) => base.clone(),
        }
    }
}

/// Build a command appropriate for the platform.
fn build_command(command: &TaskCommand) -> io::Result<Command> {
    match command {
        TaskCommand::Shell(script) => {
            let cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(script);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(script);
                c
            };
            Ok(cmd)
        }
        TaskCommand::Exec(argv) => {
            let (program, args) = argv.split_first().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector")
            })?;
            let mut c = Command::new(program);
            c.args(args);
            Ok(c)
        }
    }
}

/// Reads one output stream line by line into a bounded buffer, logging each
/// line at debug. Bytes that are not UTF-8 are replaced, never rejected.
struct OutputCapture {
    buf: Arc<Mutex<String>>,
    handle: JoinHandle<()>,
}

impl OutputCapture {
    fn spawn<R>(reader: R, task: TaskId, stream: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buf);

        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut raw = Vec::new();

            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(task = %task, stream, error = %e, "failed to read task output");
                        // Keep the pipe open until EOF so the child never sees SIGPIPE.
                        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                        break;
                    }
                }

                if raw.last() == Some(&b'\n') {
                    raw.pop();
                }
                let line = String::from_utf8_lossy(&raw);
                debug!(task = %task, stream, "{}", line);

                let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                buf.push_str(&line);
                buf.push('\n');
                trim_front(&mut buf);
            }
        });

        Self { buf, handle }
    }

    async fn finish(mut self) -> String {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut self.handle)
            .await
            .is_err()
        {
            self.handle.abort();
        }

        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }
}

/// Drop whole lines from the front until the buffer fits. A single line
/// longer than the limit keeps its tail, cut at a char boundary.
fn trim_front(buf: &mut String) {
    if buf.len() <= MAX_CAPTURED_BYTES {
        return;
    }

    let excess = buf.len() - MAX_CAPTURED_BYTES;
    let line_start = buf.as_bytes()[excess - 1..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|pos| excess + pos)
        .filter(|&start| start < buf.len());

    let cut = line_start.unwrap_or_else(|| {
        let mut cut = excess;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        cut
    });
    buf.drain(..cut);
}
