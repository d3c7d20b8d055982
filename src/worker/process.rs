use std::process::Stdio;

use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand};

use crate::config::SandboxConfig;
use crate::error::{OrchestratorError, Result};
use crate::protocol::Event;
use crate::worker::runtime::{Launcher, RuntimeChannel, RuntimeEndpoint};

/// The pytest harness run inside every runtime process.
pub const HARNESS: &str = include_str!("harness.py");

const QUEUE_CAPACITY: usize = 16;

/// Launches each runtime as a Python child process running [`HARNESS`].
///
/// Commands and events travel as newline-delimited JSON over the child's
/// stdin and stdout. The child is killed when its kill switch fires, when
/// the caller drops its half of the channel, or when the child handle is
/// dropped.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: SandboxConfig,
}

impl ProcessLauncher {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// A fresh directory per runtime, so a torn-down runtime that is still
    /// exiting never shares files with its replacement. Created under the
    /// configured workdir when set, else under the system temp dir; removed
    /// when dropped.
    fn runtime_workdir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sandbox-runtime-");
        match &self.config.workdir {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| {
                    OrchestratorError::Transport(format!(
                        "failed to create workdir {}: {e}",
                        root.display()
                    ))
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| OrchestratorError::Transport(format!("failed to create workdir: {e}")))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> Result<RuntimeChannel> {
        let workdir = self.runtime_workdir()?;

        let extra_args = serde_json::to_string(&self.config.pytest_args)
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let mut child = ProcessCommand::new(&self.config.python)
            .arg("-u")
            .arg("-c")
            .arg(HARNESS)
            .arg(extra_args)
            .current_dir(workdir.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::Transport(format!(
                    "failed to spawn {}: {e}",
                    self.config.python.display()
                ))
            })?;

        let pid = child.id();
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(OrchestratorError::Transport(
                    "runtime process has no stdio pipes".to_string(),
                ))
            }
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(BufReader::new(stderr), pid));
        }

        tracing::info!(
            pid = ?pid,
            python = %self.config.python.display(),
            workdir = %workdir.path().display(),
            "Runtime process started"
        );

        let (channel, endpoint) = RuntimeChannel::pair(QUEUE_CAPACITY);
        tokio::spawn(drive(
            child,
            stdin,
            BufReader::new(stdout),
            endpoint,
            workdir,
        ));
        Ok(channel)
    }
}

/// Pump commands into the child and events out of it until either side
/// goes away or the kill switch fires.
async fn drive(
    mut child: Child,
    mut stdin: ChildStdin,
    mut stdout: BufReader<ChildStdout>,
    mut endpoint: RuntimeEndpoint,
    workdir: TempDir,
) {
    let pid = child.id();
    // Survives cancelled reads: `read_until` appends partial lines here.
    let mut line = Vec::new();
    loop {
        tokio::select! {
            biased;

            _ = endpoint.kill.cancelled() => {
                tracing::debug!(pid = ?pid, "Kill switch fired");
                break;
            }

            command = endpoint.commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                let mut encoded = match serde_json::to_string(&command) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode command");
                        break;
                    }
                };
                encoded.push('\n');
                if let Err(e) = stdin.write_all(encoded.as_bytes()).await {
                    tracing::warn!(pid = ?pid, error = %e, "Runtime stdin closed");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::warn!(pid = ?pid, error = %e, "Runtime stdin closed");
                    break;
                }
            }

            read = stdout.read_until(b'\n', &mut line) => {
                match read {
                    Ok(0) => {
                        tracing::warn!(pid = ?pid, "Runtime process exited");
                        break;
                    }
                    Ok(_) => {
                        match serde_json::from_slice::<Event>(&line) {
                            Ok(event) => {
                                if endpoint.events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let text = String::from_utf8_lossy(&line);
                                tracing::warn!(pid = ?pid, error = %e, line = %text.trim_end(), "Skipping malformed runtime line");
                            }
                        }
                        line.clear();
                    }
                    Err(e) => {
                        tracing::warn!(pid = ?pid, error = %e, "Failed to read from runtime");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!(pid = ?pid, error = %e, "Runtime already gone");
    }
    match child.wait().await {
        Ok(status) => tracing::debug!(pid = ?pid, status = %status, "Runtime reaped"),
        Err(e) => tracing::warn!(pid = ?pid, error = %e, "Failed to reap runtime"),
    }
    drop(workdir);
}

/// Log everything the runtime writes to stderr, byte for byte until EOF.
///
/// The harness points the child's stdout at stderr too, so this pipe must
/// be drained even when the submitted code writes bytes that are not UTF-8.
async fn forward_stderr<R>(mut stderr: R, pid: Option<u32>)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        match stderr.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                tracing::debug!(target: "sandbox_orchestrator::runtime", pid = ?pid, "{}", text.trim_end());
            }
            Err(e) => {
                tracing::debug!(pid = ?pid, error = %e, "Runtime stderr closed");
                break;
            }
        }
    }
}
