//! Error taxonomy for the gateway.
//!
//! Per-unit failures are recorded on the unit's outcome and returned to the
//! caller as data. Only `ConfigurationMissing` is fatal, and only at startup.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Command '{command}' is not allowed")]
    ValidationRejected { command: String },

    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    ExecutionTimeout { command: String, timeout_ms: u64 },

    #[error("Command '{command}' could not be started: {reason}")]
    ExecutionSpawnFailed { command: String, reason: String },

    #[error("Command '{command}' exited with status {}", format_exit_code(.exit_code))]
    ExecutionExited {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Generative backend unreachable: {0}")]
    StreamConnectFailed(String),

    #[error("Generative backend stream ended without usable content: {0}")]
    StreamTruncated(String),

    #[error("Configuration error: {0}")]
    ConfigurationMissing(String),

    #[error("Request was cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Fatal errors stop the process; everything else is reported per unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::ConfigurationMissing(_))
    }
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_missing_is_fatal() {
        assert!(GatewayError::ConfigurationMissing("OLLAMA_BASE_URL".into()).is_fatal());
        assert!(
            !GatewayError::ValidationRejected {
                command: "rm -rf /".into()
            }
            .is_fatal()
        );
        assert!(!GatewayError::StreamTruncated("closed".into()).is_fatal());
        assert!(!GatewayError::Cancelled.is_fatal());
    }

    #[test]
    fn test_exit_status_display() {
        let err = GatewayError::ExecutionExited {
            command: "false".into(),
            exit_code: Some(1),
        };
        assert_eq!(err.to_string(), "Command 'false' exited with status 1");

        let err = GatewayError::ExecutionExited {
            command: "yes".into(),
            exit_code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
