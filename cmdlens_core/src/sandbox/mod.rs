//! # Time-Bounded Command Execution
//!
//! This module runs approved command units as subprocesses and reports what
//! happened. It never decides *whether* something may run; callers only hand it
//! units the allowlist approved.
//!
//! ## Guarantees
//!
//! - Every execution is bounded by a hard wall-clock timeout. On expiry the
//!   whole process group is killed and the result is marked `timed_out` with no
//!   exit code.
//! - stdout and stderr are captured fully.
//! - Spawn failures (missing binary, permission denied) are reported in the
//!   result, never raised.
//! - Execution is attempted exactly once.
//! - Dropping an in-flight execution (request cancelled, client gone) kills the
//!   process group as well.
//!
//! ## Architecture
//!
//! `SandboxExecutor` implements the `CommandRunner` trait, which is the seam the
//! orchestrator depends on.

mod command;
mod executor;
mod process_group;
mod types;

pub use command::needs_shell;
pub use executor::{CommandRunner, DEFAULT_COMMAND_TIMEOUT, SandboxConfig, SandboxExecutor};
pub use types::ExecutionResult;
