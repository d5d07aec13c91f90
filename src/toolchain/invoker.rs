//! External tool invocation.
//!
//! [`ToolInvoker`] is the single seam between the pipeline and the process
//! boundary. [`ProcessInvoker`] spawns one child per call, captures its
//! output, and enforces the caller's timeout by killing the child together
//! with anything it spawned.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::template::BoundCommand;
use crate::error::ToolError;

/// Captured result of one tool invocation.
///
/// A non-zero `exit_code` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
}

impl ToolOutput {
    /// Creates a new tool output.
    pub fn new(
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
        }
    }

    /// Checks if the tool exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    /// Returns stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) if self.stdout.ends_with('\n') => {
                format!("{}{}", self.stdout, self.stderr)
            }
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Runs `command` to completion or until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`ToolError::ExecutionFailed`] if the process cannot be spawned or
    ///   its output cannot be collected.
    /// - [`ToolError::Timeout`] if the process outlived `timeout`; the
    ///   process has been killed by the time this returns.
    async fn run(&self, command: &BoundCommand, timeout: Duration)
        -> Result<ToolOutput, ToolError>;
}

/// Invoker backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    /// Creates a new process invoker.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn run(
        &self,
        command: &BoundCommand,
        timeout: Duration,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        debug!(command = %command, ?timeout, "Spawning tool");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the run future (cancellation) must not orphan the child.
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
            program: command.program.clone(),
            reason: match e.kind() {
                ErrorKind::NotFound => "command not found".to_string(),
                ErrorKind::PermissionDenied => "permission denied".to_string(),
                _ => e.to_string(),
            },
        })?;
        let group = ProcessGroup::new(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = tokio::time::timeout(timeout, async {
            let status = async {
                let status = child.wait().await;
                // Background descendants would otherwise hold the pipes open.
                group.kill();
                status
            };
            let (status, stdout, stderr) =
                tokio::join!(status, read_stream(stdout), read_stream(stderr));
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        })
        .await;

        match waited {
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = status.code().unwrap_or(-1);
                let duration = start.elapsed();
                debug!(
                    program = %command.program,
                    exit_code,
                    ?duration,
                    "Tool finished"
                );
                Ok(ToolOutput::new(exit_code, stdout, stderr, duration))
            }
            Ok(Err(e)) => Err(ToolError::ExecutionFailed {
                program: command.program.clone(),
                reason: format!("process error: {}", e),
            }),
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(program = %command.program, error = %e, "Failed to kill timed out tool");
                }
                Err(ToolError::Timeout {
                    program: command.program.clone(),
                    after: timeout,
                })
            }
        }
    }
}

/// Process group led by a spawned tool.
///
/// Killed once the leader exits, on timeout, or when dropped with the run
/// future, so nothing the tool forked outlives the invocation.
struct ProcessGroup {
    pgid: Option<u32>,
    killed: AtomicBool,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self {
            pgid,
            killed: AtomicBool::new(false),
        }
    }

    fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(pgid) = self.pgid else {
            return;
        };
        #[cfg(unix)]
        {
            // SAFETY: a negative pid makes kill(2) signal the group only.
            let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, "Process group already gone");
            }
        }
        #[cfg(not(unix))]
        debug!(pgid, "Process groups unsupported; killing leader only");
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_stream<R>(stream: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Reads a text artifact a tool was expected to produce.
///
/// A missing or unreadable file is reported as [`ToolError::OutputMissing`],
/// distinct from the tool failing to run at all.
pub async fn read_artifact(path: &Path) -> Result<String, ToolError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Expected artifact unreadable");
            Err(ToolError::OutputMissing {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Checks that a non-text artifact (e.g. a linked binary) exists.
pub async fn expect_artifact(path: &Path) -> Result<(), ToolError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ToolError::OutputMissing {
            path: path.to_path_buf(),
        }),
    }
}
