//! Subprocess launching with timeout, cancellation, and output capture.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vpress_models::JobId;

use crate::error::{MediaError, MediaResult};

/// Upper bound on retained diagnostic output per process.
const OUTPUT_CAP_BYTES: usize = 16 * 1024;

/// Wall-clock limit for health-probe invocations.
const PROBE_TIMEOUT_SECS: u64 = 5;

/// Table of running external processes keyed by job id.
///
/// Each entry holds the cancellation handle for one subprocess; a job owns at
/// most one subprocess at a time, and the handle is invalidated when the
/// process exits.
#[derive(Debug, Default)]
pub struct ProcessTable {
    inner: Mutex<HashMap<JobId, watch::Sender<bool>>>,
}

impl ProcessTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently running external processes.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Request termination of the subprocess owned by `job_id`.
    ///
    /// Returns false when no process is registered for the job.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.lock().get(job_id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    fn register(&self, job_id: &JobId) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.lock().insert(job_id.clone(), tx);
        rx
    }

    fn deregister(&self, job_id: &JobId) {
        self.lock().remove(job_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, watch::Sender<bool>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Byte-capped rolling buffer of recent process output lines.
#[derive(Debug, Default)]
struct OutputBuffer {
    lines: VecDeque<String>,
    bytes: usize,
}

impl OutputBuffer {
    fn push(&mut self, line: String) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line);
        while self.bytes > OUTPUT_CAP_BYTES {
            match self.lines.pop_front() {
                Some(dropped) => self.bytes -= dropped.len() + 1,
                None => break,
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs external tools with a wall-clock timeout and per-job cancellation.
pub struct ToolRunner {
    table: Arc<ProcessTable>,
    timeout: Option<Duration>,
}

impl ToolRunner {
    /// Create a runner registering its processes in `table`.
    pub fn new(table: Arc<ProcessTable>) -> Self {
        Self {
            table,
            timeout: None,
        }
    }

    /// Set the wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Launch `program` with a discrete argument vector.
    ///
    /// stderr lines are passed to `on_line` as they arrive; stdout and stderr
    /// are both retained in a bounded buffer that is surfaced in failure
    /// errors. The process is registered in the table for the duration of
    /// the run so it can be cancelled externally by job id.
    pub async fn run<F>(
        &self,
        job_id: &JobId,
        program: &str,
        args: &[String],
        mut on_line: F,
    ) -> MediaResult<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))?;

        debug!(job_id = %job_id, "Running {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let buffer = Arc::new(Mutex::new(OutputBuffer::default()));

        let stderr = child.stderr.take();
        let stderr_buf = Arc::clone(&buffer);
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    on_line(&line);
                    stderr_buf
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(line);
                }
            }
        });

        let stdout = child.stdout.take();
        let stdout_buf = Arc::clone(&buffer);
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    stdout_buf
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(line);
                }
            }
        });

        let mut cancel_rx = self.table.register(job_id);
        let result = self.wait_for_exit(&mut child, &mut cancel_rx, program).await;
        self.table.deregister(job_id);

        // Drain whatever output arrived before (or briefly after) exit
        let _ = stderr_task.await;
        let _ = stdout_task.await;

        let status = result?;
        if status.success() {
            Ok(())
        } else {
            let detail = buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .snapshot();
            warn!(
                job_id = %job_id,
                tool = program,
                exit_code = ?status.code(),
                "External tool failed: {}", detail
            );
            Err(MediaError::tool_failed(program, status.code(), detail))
        }
    }

    /// Wait for the child with cancellation and timeout applied.
    async fn wait_for_exit(
        &self,
        child: &mut Child,
        cancel_rx: &mut watch::Receiver<bool>,
        program: &str,
    ) -> MediaResult<std::process::ExitStatus> {
        enum Outcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            Cancelled,
            TimedOut,
        }

        let deadline = self.timeout.map(|t| tokio::time::Instant::now() + t);
        let mut cancel_closed = false;

        // The wait future borrows the child; it is dropped with this block
        // so the kill below can borrow it again.
        let outcome = {
            let wait = child.wait();
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    status = &mut wait => break Outcome::Exited(status),
                    res = cancel_rx.changed(), if !cancel_closed => {
                        match res {
                            Ok(()) if *cancel_rx.borrow() => break Outcome::Cancelled,
                            Ok(()) => {}
                            // Sender gone without a cancel request: keep waiting
                            Err(_) => cancel_closed = true,
                        }
                    }
                    _ = sleep_until_opt(deadline), if deadline.is_some() => {
                        break Outcome::TimedOut;
                    }
                }
            }
        };

        match outcome {
            Outcome::Exited(status) => Ok(status?),
            Outcome::Cancelled => {
                info!("{} cancelled, killing process", program);
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            Outcome::TimedOut => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!(
                    "{} timed out after {} seconds, killing process",
                    program, secs
                );
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Check that a tool is present in PATH.
pub fn check_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}

/// Quick `-version`-style invocation used by health probes.
pub async fn probe_tool(program: &str, version_arg: &str) -> MediaResult<()> {
    check_tool(program)?;

    let output = tokio::time::timeout(
        Duration::from_secs(PROBE_TIMEOUT_SECS),
        Command::new(program)
            .arg(version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output(),
    )
    .await
    .map_err(|_| MediaError::Timeout(PROBE_TIMEOUT_SECS))??;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(MediaError::tool_failed(
            program,
            output.status.code(),
            stderr.lines().last().unwrap_or("unknown error").to_string(),
        ))
    }
}
