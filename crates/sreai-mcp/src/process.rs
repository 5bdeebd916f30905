//! Stdio child processes and their exit reporting.
//!
//! Every spawned server gets exactly one background task. It owns the child,
//! drains stderr into a bounded buffer, and publishes the exit outcome through
//! a single-slot channel that any number of waits can observe via [`ExitWatch`].

use crate::error::McpError;
use crate::launcher::LaunchPlan;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::oneshot;

/// Bytes of stderr kept in memory per process.
const STDERR_CAPTURE_BYTES: usize = 64 * 1024;

/// Bytes of stderr surfaced in errors and results.
pub const STDERR_TAIL_BYTES: usize = 400;

/// How long to keep reading stderr after the child exits.
const STDERR_DRAIN: Duration = Duration::from_millis(250);

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// Exit code, or `None` when terminated by a signal.
    Exited(Option<i32>),
    /// Waiting on the child failed.
    WaitFailed(String),
}

impl ExitReport {
    fn from_wait(result: std::io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) => ExitReport::Exited(status.code()),
            Err(e) => ExitReport::WaitFailed(e.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitReport::Exited(Some(0)))
    }

    /// Exit code as reported to callers; signals map to -1.
    pub fn code(&self) -> i32 {
        match self {
            ExitReport::Exited(Some(code)) => *code,
            _ => -1,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ExitReport::Exited(Some(code)) => format!("exit status {code}"),
            ExitReport::Exited(None) => "terminated by signal".to_string(),
            ExitReport::WaitFailed(reason) => format!("wait failed: {reason}"),
        }
    }

    /// Error for a request interrupted by this exit.
    pub fn into_error(self) -> McpError {
        if self.success() {
            McpError::Protocol("server exited before response".into())
        } else {
            McpError::ServerExited {
                reason: self.describe(),
            }
        }
    }
}

/// Observes the exit of a process. The outcome is cached once received.
#[derive(Debug)]
pub struct ExitWatch {
    rx: Option<oneshot::Receiver<ExitReport>>,
    report: Option<ExitReport>,
}

impl ExitWatch {
    pub fn new(rx: oneshot::Receiver<ExitReport>) -> Self {
        Self {
            rx: Some(rx),
            report: None,
        }
    }

    /// Wait for the exit outcome. Cancel-safe: dropping the future loses nothing.
    pub async fn wait(&mut self) -> ExitReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        let report = match self.rx.as_mut() {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| ExitReport::WaitFailed("exit watcher stopped".into())),
            None => ExitReport::WaitFailed("exit watcher stopped".into()),
        };
        self.rx = None;
        self.report = Some(report.clone());
        report
    }
}

/// Bounded stderr buffer shared between the waiter task and the session.
#[derive(Debug, Clone, Default)]
pub(crate) struct StderrCapture(Arc<Mutex<Vec<u8>>>);

impl StderrCapture {
    fn append(&self, chunk: &[u8]) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(chunk);
        if buf.len() > STDERR_CAPTURE_BYTES {
            let excess = buf.len() - STDERR_CAPTURE_BYTES;
            buf.drain(..excess);
        }
    }

    pub(crate) fn tail(&self, max_bytes: usize) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let text = String::from_utf8_lossy(&buf);
        sreai_types::tail_str(&text, max_bytes).to_string()
    }
}

/// Kill switch and stderr access for a running process.
///
/// Dropping the control also terminates the process.
#[derive(Debug)]
pub(crate) struct ProcessControl {
    kill_tx: Option<oneshot::Sender<()>>,
    stderr: StderrCapture,
}

impl ProcessControl {
    /// Ask the waiter task to kill the child. Idempotent.
    pub(crate) fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Trimmed tail of captured stderr.
    pub(crate) fn stderr_tail(&self) -> String {
        self.stderr.tail(STDERR_TAIL_BYTES)
    }
}

/// A spawned server with piped stdio.
pub(crate) struct StdioProcess {
    pub stdin: ChildStdin,
    pub stdout: BufReader<ChildStdout>,
    pub exit: ExitWatch,
    pub control: ProcessControl,
}

/// Spawn `plan` with piped stdio and start its waiter task.
pub(crate) fn spawn_stdio(alias: &str, plan: &LaunchPlan) -> Result<StdioProcess, McpError> {
    let mut command = plan.command();
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| McpError::Launch {
        alias: alias.to_string(),
        source,
    })?;
    tracing::debug!("Spawned MCP server '{}' (pid {:?})", alias, child.id());

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| McpError::Protocol("child stdin was not captured".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| McpError::Protocol("child stdout was not captured".into()))?;
    let stderr = child.stderr.take();

    let capture = StderrCapture::default();
    let (exit_tx, exit_rx) = oneshot::channel();
    let (kill_tx, kill_rx) = oneshot::channel();
    tokio::spawn(watch_child(child, stderr, capture.clone(), kill_rx, exit_tx));

    Ok(StdioProcess {
        stdin,
        stdout: BufReader::new(stdout),
        exit: ExitWatch::new(exit_rx),
        control: ProcessControl {
            kill_tx: Some(kill_tx),
            stderr: capture,
        },
    })
}

async fn watch_child(
    mut child: Child,
    mut stderr: Option<ChildStderr>,
    capture: StderrCapture,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ExitReport>,
) {
    let exited = loop {
        tokio::select! {
            status = child.wait() => break Some(status),
            _ = &mut kill_rx => break None,
            chunk = read_chunk(&mut stderr), if stderr.is_some() => match chunk {
                Some(chunk) => capture.append(&chunk),
                None => stderr = None,
            },
        }
    };

    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to kill MCP server process: {e}");
            }
            child.wait().await
        }
    };

    if let Some(mut pipe) = stderr {
        let drain = async {
            while let Some(chunk) = read_chunk_from(&mut pipe).await {
                capture.append(&chunk);
            }
        };
        let _ = tokio::time::timeout(STDERR_DRAIN, drain).await;
    }

    let report = ExitReport::from_wait(status);
    tracing::debug!("MCP server process finished: {}", report.describe());
    let _ = exit_tx.send(report);
}

async fn read_chunk(stderr: &mut Option<ChildStderr>) -> Option<Vec<u8>> {
    match stderr {
        Some(pipe) => read_chunk_from(pipe).await,
        None => std::future::pending().await,
    }
}

/// One read from the pipe; `None` at EOF or on error.
async fn read_chunk_from(pipe: &mut ChildStderr) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 4096];
    match pipe.read(&mut buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => {
            buf.truncate(n);
            Some(buf)
        }
    }
}

/// Wait up to `grace` for the process to exit on its own, then kill it and
/// wait for the final report.
pub(crate) async fn reap(
    exit: &mut ExitWatch,
    control: &mut ProcessControl,
    grace: Duration,
) -> ExitReport {
    match tokio::time::timeout(grace, exit.wait()).await {
        Ok(report) => report,
        Err(_) => {
            tracing::debug!("MCP server did not exit within {:?}, killing", grace);
            control.kill();
            exit.wait().await
        }
    }
}
