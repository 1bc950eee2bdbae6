//! # cmdlens core
//!
//! The command-execution gateway behind the `cmdlens` HTTP service. A free-text
//! directive is split into independent command units, every unit is checked
//! against an exact-match allowlist, approved units run inside a time-bounded
//! subprocess, and the captured output is streamed through a generative text
//! backend to produce a short explanation (or a severity-bearing summary for the
//! fixed health probes).
//!
//! ## Modules
//!
//! - **`allowlist`**: the exact-match command allowlist and directive splitting.
//! - **`sandbox`**: the subprocess executor with hard timeouts and process-group kill.
//! - **`explainer`**: the streaming backend client, fragment decoder and prompt templates.
//! - **`orchestrator`**: per-unit pipeline, bounded fan-out and outcome assembly.
//! - **`config`**: startup configuration, including allowlist files.
//! - **`retry`**: opt-in retry policy for backend connection failures.
//! - **`utils`**: logging initialisation.
//!
//! ## Security Note
//! The allowlist is the only boundary deciding what runs. Validation is exact
//! string equality on each unit after splitting on the conjunction delimiter, so
//! appending shell content to an approved command never yields an approved unit.

pub mod allowlist;
pub mod config;
pub mod error;
pub mod explainer;
pub mod orchestrator;
pub mod retry;
pub mod sandbox;
pub mod utils;

pub use allowlist::{Allowlist, AllowlistEntry, CommandUnit, ValidationOutcome, split_directive};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use explainer::{
    BackendClient, ExplainContext, ExplainError, Explainer, PromptTemplate, StreamingExplainer,
};
pub use orchestrator::{
    AggregateResponse, OrchestratorSettings, Probe, RequestOrchestrator, Severity, UnitOutcome,
    UnitSet, UnitStatus,
};
pub use sandbox::{CommandRunner, ExecutionResult, SandboxConfig, SandboxExecutor};
