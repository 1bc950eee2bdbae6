use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::command;
use super::process_group::ProcessGroupGuard;
use super::types::ExecutionResult;
use crate::allowlist::CommandUnit;

/// Default hard timeout for a single command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs approved command units.
///
/// Implementations must never panic or return an error: every way a run can go
/// wrong is described by the returned `ExecutionResult`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, unit: &CommandUnit) -> ExecutionResult;
}

/// Settings for the subprocess executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub timeout: Duration,
    /// Shell used for allowlist entries that contain shell syntax.
    pub shell: PathBuf,
    /// Working directory for spawned commands; inherits the server's when `None`.
    pub working_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            shell: PathBuf::from("/bin/sh"),
            working_dir: None,
        }
    }
}

/// Spawns approved commands with a hard wall-clock bound.
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `unit` once, killing its process group if it outlives `timeout`.
    pub async fn execute(&self, unit: &CommandUnit, timeout: Duration) -> ExecutionResult {
        let command_text = unit.trimmed();
        let timeout_ms = timeout.as_millis() as u64;
        let start = Instant::now();

        let mut cmd = match command::build_command(command_text, &self.config) {
            Ok(cmd) => cmd,
            Err(reason) => {
                tracing::warn!(command = %command_text, "Refusing to build command: {}", reason);
                return ExecutionResult::spawn_failed(unit, reason, 0, timeout_ms);
            }
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(command = %command_text, "Failed to spawn process: {}", e);
                return ExecutionResult::spawn_failed(unit, e.to_string(), duration_ms, timeout_ms);
            }
        };

        let mut group = ProcessGroupGuard::new(child.id());
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let waited = tokio::time::timeout(timeout, async {
            tokio::join!(
                read_pipe(stdout_pipe),
                read_pipe(stderr_pipe),
                child.wait()
            )
        })
        .await;

        let result = match waited {
            Ok((stdout, stderr, Ok(status))) => ExecutionResult {
                unit: unit.clone(),
                exit_code: status.code(),
                stdout,
                stderr,
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
                spawn_error: None,
                timeout_ms,
            },
            Ok((stdout, stderr, Err(e))) => ExecutionResult {
                unit: unit.clone(),
                exit_code: None,
                stdout,
                stderr,
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
                spawn_error: Some(format!("Failed to wait for process: {}", e)),
                timeout_ms,
            },
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    tracing::debug!(command = %command_text, "Kill after timeout: {}", e);
                }
                ExecutionResult {
                    unit: unit.clone(),
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    timed_out: true,
                    spawn_error: None,
                    timeout_ms,
                }
            }
        };

        // Kill anything the command left running in its group.
        group.kill();

        tracing::info!(
            command = %command_text,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            timed_out = result.timed_out,
            "Command finished"
        );
        result
    }
}

#[async_trait]
impl CommandRunner for SandboxExecutor {
    async fn run(&self, unit: &CommandUnit) -> ExecutionResult {
        self.execute(unit, self.config.timeout).await
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!("Error reading command output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
