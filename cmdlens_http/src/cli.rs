//! Command-line arguments for the `cmdlens` binary.

use crate::server::ServerConfig;
use clap::Parser;
use cmdlens_core::config::{ConfigError, DEFAULT_MODEL, GatewayConfig, load_allowlist_file};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Run allowlisted shell commands and explain their output with a local LLM.
#[derive(Parser, Debug)]
#[command(name = "cmdlens")]
#[command(version, about)]
pub struct Args {
    /// Address to bind the HTTP server.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub bind_addr: SocketAddr,

    /// Base URL of the Ollama-compatible backend, e.g. http://127.0.0.1:11434.
    #[arg(long, env = "OLLAMA_BASE_URL")]
    pub backend_url: Option<String>,

    /// Model name sent with every generate request.
    #[arg(long, env = "OLLAMA_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Per-command execution timeout.
    #[arg(long, default_value_t = 5)]
    pub command_timeout_secs: u64,

    /// Deadline for one explanation, from request to end of stream.
    #[arg(long, default_value_t = 60)]
    pub explain_timeout_secs: u64,

    /// TCP connect timeout for the backend.
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Deadline for one whole HTTP request.
    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Units of one request processed at the same time.
    #[arg(long, default_value_t = 4)]
    pub max_concurrency: usize,

    /// Separator between units of a directive.
    #[arg(long, default_value = "&&")]
    pub delimiter: String,

    /// JSON file with the allowed commands and, optionally, the health probes.
    #[arg(long)]
    pub allowlist: Option<PathBuf>,

    /// Extra attempts for a failed explanation.
    #[arg(long, default_value_t = 0)]
    pub explain_retries: u32,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write logs to a rolling file in the user cache directory.
    #[arg(long)]
    pub log_to_file: bool,
}

impl Args {
    /// Resolve the arguments into a validated server configuration.
    pub async fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let mut gateway = GatewayConfig::from_backend_url(self.backend_url.as_deref())?;
        if let Some(path) = &self.allowlist {
            let file = load_allowlist_file(path).await?;
            gateway = gateway.with_allowlist_file(file);
        }

        gateway.model = self.model;
        gateway.command_timeout = Duration::from_secs(self.command_timeout_secs);
        gateway.explain_timeout = Duration::from_secs(self.explain_timeout_secs);
        gateway.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        gateway.request_timeout = Duration::from_secs(self.request_timeout_secs);
        gateway.max_concurrency = self.max_concurrency;
        gateway.delimiter = self.delimiter;
        gateway.explain_retries = self.explain_retries;
        gateway.validate()?;

        Ok(ServerConfig {
            bind_addr: self.bind_addr,
            gateway,
        })
    }
}
