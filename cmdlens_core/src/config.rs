//! Startup configuration.
//!
//! `GatewayConfig` is assembled once, validated, and then used to build the
//! long-lived components (allowlist, executor, backend client, orchestrator).
//! Nothing here is consulted per request.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::allowlist::{Allowlist, AllowlistEntry, DEFAULT_DELIMITER, default_entries};
use crate::error::GatewayError;
use crate::explainer::{BackendClient, ExplainError, StreamingExplainer};
use crate::orchestrator::{
    DEFAULT_MAX_CONCURRENCY, OrchestratorSettings, Probe, RequestOrchestrator, default_probes,
};
use crate::retry::RetryConfig;
use crate::sandbox::{CommandRunner, DEFAULT_COMMAND_TIMEOUT, SandboxConfig, SandboxExecutor};

pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_EXPLAIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        GatewayError::ConfigurationMissing(e.to_string())
    }
}

/// On-disk allowlist and probe definitions.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowlistFile {
    pub commands: Vec<AllowlistEntry>,
    #[serde(default)]
    pub probes: Option<Vec<ProbeEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeEntry {
    /// Defaults to `command`.
    #[serde(default)]
    pub name: Option<String>,
    pub command: String,
    pub description: String,
}

impl From<ProbeEntry> for Probe {
    fn from(entry: ProbeEntry) -> Self {
        let name = entry.name.unwrap_or_else(|| entry.command.clone());
        Probe::new(name, entry.command, entry.description)
    }
}

impl AllowlistFile {
    pub fn from_json(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Read and parse an allowlist file. Semantic checks happen in
/// [`GatewayConfig::validate`].
pub async fn load_allowlist_file(path: &Path) -> Result<AllowlistFile, ConfigError> {
    tracing::debug!("Loading allowlist from {}", path.display());
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    AllowlistFile::from_json(&contents, path)
}

/// Everything needed to build the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub backend_url: Url,
    pub model: String,
    pub command_timeout: Duration,
    pub explain_timeout: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_concurrency: usize,
    pub delimiter: String,
    pub allowlist: Vec<AllowlistEntry>,
    pub probes: Vec<Probe>,
    /// Extra attempts for failed explanations; 0 disables retries.
    pub explain_retries: u32,
}

impl GatewayConfig {
    /// Defaults for everything except the backend address.
    pub fn new(backend_url: Url) -> Self {
        Self {
            backend_url,
            model: DEFAULT_MODEL.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            explain_timeout: DEFAULT_EXPLAIN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            delimiter: DEFAULT_DELIMITER.to_string(),
            allowlist: default_entries(),
            probes: default_probes(),
            explain_retries: 0,
        }
    }

    /// Start from a raw backend address as given on the command line or in
    /// the environment. A missing or blank address is an error.
    pub fn from_backend_url(raw: Option<&str>) -> Result<Self, ConfigError> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            ConfigError::Missing(
                "generative backend URL (set --backend-url or OLLAMA_BASE_URL)".to_string(),
            )
        })?;
        Ok(Self::new(parse_backend_url(raw)?))
    }

    /// Replace the built-in allowlist (and, if the file has them, the probes).
    pub fn with_allowlist_file(mut self, file: AllowlistFile) -> Self {
        self.allowlist = file.commands;
        if let Some(probes) = file.probes {
            self.probes = probes.into_iter().map(Probe::from).collect();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("command timeout", self.command_timeout),
            ("explain timeout", self.explain_timeout),
            ("connect timeout", self.connect_timeout),
            ("request timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max concurrency", "must be at least 1"));
        }
        if self.delimiter.trim().is_empty() {
            return Err(ConfigError::invalid("delimiter", "must not be blank"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be blank"));
        }

        let mut commands = HashSet::new();
        for entry in &self.allowlist {
            if entry.command.trim().is_empty() {
                return Err(ConfigError::invalid("allowlist", "blank command"));
            }
            if entry.command.trim() != entry.command {
                return Err(ConfigError::invalid(
                    "allowlist",
                    format!("command '{}' has surrounding whitespace", entry.command),
                ));
            }
            if !commands.insert(entry.command.as_str()) {
                return Err(ConfigError::invalid(
                    "allowlist",
                    format!("duplicate command '{}'", entry.command),
                ));
            }
        }

        let mut names = HashSet::new();
        for probe in &self.probes {
            if !commands.contains(probe.command.as_str()) {
                return Err(ConfigError::invalid(
                    "probes",
                    format!("probe command '{}' is not on the allowlist", probe.command),
                ));
            }
            if !names.insert(probe.name.as_str()) {
                return Err(ConfigError::invalid(
                    "probes",
                    format!("duplicate probe name '{}'", probe.name),
                ));
            }
        }
        Ok(())
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            timeout: self.command_timeout,
            ..SandboxConfig::default()
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            delimiter: self.delimiter.clone(),
            max_concurrency: self.max_concurrency,
            probes: self.probes.clone(),
        }
    }

    pub fn retry_config(&self) -> Option<RetryConfig> {
        (self.explain_retries > 0).then(|| {
            RetryConfig::new()
                .with_max_retries(self.explain_retries)
                .with_jitter(true)
        })
    }

    pub fn build_allowlist(&self) -> Allowlist {
        Allowlist::new(self.allowlist.clone())
    }

    pub fn backend_client(&self) -> Result<BackendClient, ExplainError> {
        BackendClient::new(
            &self.backend_url,
            self.model.clone(),
            self.connect_timeout,
            self.explain_timeout,
        )
    }

    /// Build the orchestrator with the real subprocess executor and backend.
    pub fn build_orchestrator(
        &self,
        client: BackendClient,
    ) -> Result<RequestOrchestrator, ConfigError> {
        self.validate()?;
        let mut explainer = StreamingExplainer::new(client);
        if let Some(retry) = self.retry_config() {
            explainer = explainer.with_retry(retry);
        }
        let runner: Arc<dyn CommandRunner> =
            Arc::new(SandboxExecutor::new(self.sandbox_config()));
        Ok(RequestOrchestrator::new(
            Arc::new(self.build_allowlist()),
            runner,
            Arc::new(explainer),
            self.orchestrator_settings(),
        ))
    }
}

fn parse_backend_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig::from_backend_url(Some("http://localhost:11434")).unwrap()
    }

    #[test]
    fn test_missing_backend_url() {
        assert!(matches!(
            GatewayConfig::from_backend_url(None),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            GatewayConfig::from_backend_url(Some("  ")),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_missing_backend_url_is_fatal() {
        let err: GatewayError = GatewayConfig::from_backend_url(None).unwrap_err().into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_backend_url_scheme() {
        assert!(matches!(
            GatewayConfig::from_backend_url(Some("unix:///tmp/ollama.sock")),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            GatewayConfig::from_backend_url(Some("not a url")),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.model, "llama3");
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.delimiter, "&&");
        assert!(config.retry_config().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_concurrency_and_blank_delimiter() {
        let mut config = config();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.delimiter = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_allowlist_commands() {
        let mut config = config();
        config.allowlist.push(AllowlistEntry::new("df -h", "again"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate command 'df -h'"));
    }

    #[test]
    fn test_probe_must_be_allowlisted() {
        let mut config = config();
        config.probes.push(Probe::new("kernel", "uname -a", "Kernel"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allowlist_file_replaces_defaults() {
        let json = r#"{
            "commands": [{"command": "date", "description": "Current time"}],
            "probes": [{"command": "date", "description": "Clock"}]
        }"#;
        let file = AllowlistFile::from_json(json, Path::new("allowlist.json")).unwrap();
        let config = config().with_allowlist_file(file);
        assert_eq!(config.allowlist.len(), 1);
        assert_eq!(config.probes, vec![Probe::new("date", "date", "Clock")]);
        config.validate().unwrap();
    }

    #[test]
    fn test_allowlist_file_without_probes_keeps_defaults() {
        let json = r#"{"commands": [
            {"command": "uptime", "description": "Load"},
            {"command": "df -h", "description": "Disk"},
            {"command": "free -h", "description": "Memory"},
            {"command": "whoami", "description": "User"}
        ]}"#;
        let file = AllowlistFile::from_json(json, Path::new("allowlist.json")).unwrap();
        let config = config().with_allowlist_file(file);
        assert_eq!(config.probes, default_probes());
        config.validate().unwrap();
    }

    #[test]
    fn test_allowlist_file_rejects_unknown_fields() {
        let json = r#"{"commands": [], "patterns": ["rm *"]}"#;
        assert!(matches!(
            AllowlistFile::from_json(json, Path::new("allowlist.json")),
            Err(ConfigError::Parse { .. })
        ));
    }
}
