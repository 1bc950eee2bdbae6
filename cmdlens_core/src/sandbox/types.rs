use serde::Serialize;

use crate::allowlist::CommandUnit;
use crate::error::GatewayError;

/// Everything observed while running one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub unit: CommandUnit,
    /// `None` when the process timed out, failed to spawn, or died from a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub spawn_error: Option<String>,
    /// The bound that applied to this execution.
    pub timeout_ms: u64,
}

impl ExecutionResult {
    pub(crate) fn spawn_failed(
        unit: &CommandUnit,
        reason: String,
        duration_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            unit: unit.clone(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms,
            timed_out: false,
            spawn_error: Some(reason),
            timeout_ms,
        }
    }

    /// True only for a process that started, finished in time and exited with 0.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.spawn_error.is_none() && self.exit_code == Some(0)
    }

    /// stdout if non-empty, else stderr.
    pub fn selected_output(&self) -> &str {
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }

    /// Text describing why no process output exists, if the process never got that far.
    pub fn error_text(&self) -> Option<String> {
        if let Some(reason) = &self.spawn_error {
            return Some(reason.clone());
        }
        if self.timed_out {
            return Some(format!(
                "Command timed out after {}ms and was terminated",
                self.timeout_ms
            ));
        }
        None
    }

    /// What gets forwarded to the explainer: captured output, or the error text
    /// when the process produced none. `None` means literally nothing was produced.
    pub fn explainable_output(&self) -> Option<String> {
        let selected = self.selected_output();
        if !selected.is_empty() {
            return Some(selected.to_string());
        }
        self.error_text()
    }

    /// The typed failure for this execution, if any.
    pub fn failure(&self) -> Option<GatewayError> {
        let command = self.unit.trimmed().to_string();
        if let Some(reason) = &self.spawn_error {
            return Some(GatewayError::ExecutionSpawnFailed {
                command,
                reason: reason.clone(),
            });
        }
        if self.timed_out {
            return Some(GatewayError::ExecutionTimeout {
                command,
                timeout_ms: self.timeout_ms,
            });
        }
        if self.exit_code != Some(0) {
            return Some(GatewayError::ExecutionExited {
                command,
                exit_code: self.exit_code,
            });
        }
        None
    }
}
