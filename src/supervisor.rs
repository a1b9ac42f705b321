//! Worker process supervisor.
//!
//! Spawns the task-index worker subprocess with:
//! - `kill_on_drop(true)` so orphaned workers are cleaned up automatically;
//! - all three standard streams piped — stdin carries requests, stdout
//!   carries responses, stderr is a non-protocol diagnostic channel;
//! - a bounded startup wait: the worker's first stdout line is its ready
//!   signal, and if none arrives within the window the process is killed
//!   and [`ClientError::Launch`] is returned.
//!
//! The supervisor knows nothing about the protocol; it only manages the
//! process lifecycle and hands the streams to the client.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ClientError, Result};

// ── Configuration ────────────────────────────────────────────────────────────

/// Operating mode passed to the worker's `--mode` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Long-running JSON-RPC server loop on stdin/stdout.
    Server,
}

impl WorkerMode {
    /// The flag value the worker expects on its command line.
    #[must_use]
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Server => "server",
        }
    }
}

/// Configuration for spawning a worker process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Worker executable path.
    pub worker_path: PathBuf,
    /// Extra arguments inserted before the fixed launch contract.
    pub worker_args: Vec<String>,
    /// Workspace root passed via `--workspace`; also the child's cwd.
    pub workspace_root: PathBuf,
    /// Operating mode passed via `--mode`.
    pub mode: WorkerMode,
    /// Maximum time to wait for the worker's ready signal (first stdout
    /// line). On expiry the process is killed and spawning fails.
    pub startup_timeout: Duration,
}

// ── Connection handle ────────────────────────────────────────────────────────

/// Active stdio connection to a spawned worker process.
///
/// The caller is responsible for keeping `child` alive (it has
/// `kill_on_drop(true)`), writing requests to `stdin`, and reading
/// responses from `stdout`.
#[derive(Debug)]
pub struct WorkerConnection {
    /// OS process id, for diagnostics.
    pub pid: u32,
    /// Child process handle.
    pub child: Child,
    /// Worker's stdin for outbound request lines.
    pub stdin: ChildStdin,
    /// Buffered reader over the worker's stdout. The ready line has already
    /// been consumed; the next bytes are protocol output.
    pub stdout: BufReader<ChildStdout>,
    /// Worker's stderr, a non-protocol diagnostic channel.
    pub stderr: ChildStderr,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn a worker process and wait for its ready signal.
///
/// The worker is launched with the fixed argument contract
/// `--workspace <root> --mode <mode>` appended after any configured extra
/// arguments, then the spawner waits up to `config.startup_timeout` for the
/// first line of stdout. The worker prints a startup banner as that line;
/// it is consumed here and never reaches protocol dispatch.
///
/// # Errors
///
/// - [`ClientError::Launch`] — OS spawn failure, a standard stream could
///   not be captured, EOF before the ready signal, or startup timeout.
pub async fn spawn_worker(config: &SpawnConfig) -> Result<WorkerConnection> {
    let mut cmd = Command::new(&config.worker_path);

    for arg in &config.worker_args {
        cmd.arg(arg);
    }
    cmd.arg("--workspace")
        .arg(&config.workspace_root)
        .arg("--mode")
        .arg(config.mode.as_flag());

    cmd.current_dir(&config.workspace_root)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| ClientError::Launch(format!("failed to spawn worker: {err}")))?;

    let pid = child.id().unwrap_or_default();

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| ClientError::Launch("failed to capture worker stdin".into()))?;
    let stdout_raw = child
        .stdout
        .take()
        .ok_or_else(|| ClientError::Launch("failed to capture worker stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ClientError::Launch("failed to capture worker stderr".into()))?;

    let mut reader = BufReader::new(stdout_raw);
    let mut line = String::new();

    match tokio::time::timeout(config.startup_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => {
            info!(pid, ready_line = line.trim(), "worker emitted ready signal");
        }
        Ok(Ok(_)) => {
            // n == 0 means EOF — the worker exited before printing anything.
            return Err(ClientError::Launch(
                "worker process exited before ready signal".into(),
            ));
        }
        Ok(Err(err)) => {
            return Err(ClientError::Launch(format!(
                "failed to read worker ready signal: {err}"
            )));
        }
        Err(_elapsed) => {
            // Kill the process before returning the error.
            child.kill().await.ok();
            return Err(ClientError::Launch(format!(
                "startup timeout: worker did not emit ready signal within {:?}",
                config.startup_timeout
            )));
        }
    }

    Ok(WorkerConnection {
        pid,
        child,
        stdin,
        stdout: reader,
        stderr,
    })
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Terminal fate of a worker process, as observed by [`monitor_exit`].
#[derive(Debug, Clone)]
pub struct WorkerExit {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Human-readable exit description for logging.
    pub reason: String,
}

/// Spawn a background task that awaits child-process exit and reports it
/// through `exit_tx`.
///
/// When `cancel` fires first the task kills the process (idempotent — a
/// process that already exited ignores the kill) and exits without
/// reporting, leaving teardown to the cancelling caller.
#[must_use]
pub fn monitor_exit(
    pid: u32,
    mut child: Child,
    exit_tx: mpsc::Sender<WorkerExit>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let (code, reason) = match result {
                    Ok(status) => {
                        let code = status.code();
                        let reason = code.map_or_else(
                            || "process terminated by signal".to_owned(),
                            |c| format!("process exited with code {c}"),
                        );
                        (code, reason)
                    }
                    Err(err) => {
                        warn!(pid, %err, "error waiting for worker process");
                        (None, format!("wait error: {err}"))
                    }
                };

                if exit_tx.send(WorkerExit { code, reason }).await.is_err() {
                    debug!(pid, "exit_tx closed before worker exit could be delivered");
                }
            }
            () = cancel.cancelled() => {
                child.kill().await.ok();
                debug!(pid, "exit monitor: cancellation received, worker killed");
            }
        }
    })
}

// ── Diagnostic drain ─────────────────────────────────────────────────────────

/// Spawn a background task that reads the worker's stderr line-by-line and
/// routes each line to structured logging.
///
/// stderr is a pure diagnostic channel; its content is never interpreted as
/// protocol and never fails the connection.
#[must_use]
pub fn drain_stderr(pid: u32, stderr: ChildStderr, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(pid, "stderr drain: cancellation received, stopping");
                    break;
                }
                next = lines.next_line() => {
                    match next {
                        Ok(Some(line)) => {
                            debug!(pid, worker_stderr = line.as_str(), "worker diagnostic");
                        }
                        Ok(None) => {
                            debug!(pid, "stderr drain: EOF");
                            break;
                        }
                        Err(err) => {
                            warn!(pid, %err, "stderr drain: read error, stopping");
                            break;
                        }
                    }
                }
            }
        }
    })
}
