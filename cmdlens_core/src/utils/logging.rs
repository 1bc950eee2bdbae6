//! # Logging Initialization
//!
//! One global `tracing` subscriber for the process, installed by
//! [`init_logging`]. Later calls are no-ops.
//!
//! - Verbosity comes from `RUST_LOG` when set, else from the level passed in
//!   (with the chatty HTTP client crates held at `warn`).
//! - Logs go to stderr with ANSI colors by default. With `log_to_file` they go
//!   to a daily rolling file in the user cache directory instead, falling back
//!   to stderr when that directory is not writable.
//! - With the `opentelemetry` feature, spans are also exported over OTLP when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` or `CMDLENS_TRACING` is set.

use anyhow::Result;
use directories::ProjectDirs;
#[cfg(feature = "opentelemetry")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "opentelemetry")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::{
    Resource,
    trace::{self as sdktrace, SdkTracerProvider},
};
use std::io::stderr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

const LOG_FILE_PREFIX: &str = "cmdlens.log";

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Directory holding the rolling log files.
    File(PathBuf),
}

static TARGET: OnceLock<LogTarget> = OnceLock::new();

/// Trace-level stderr logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Install the global subscriber and report where logs go.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<LogTarget> {
    let target = TARGET.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{log_level},hyper=warn,hyper_util=warn,reqwest=warn"))
        });

        if log_to_file
            && let Some(dirs) = ProjectDirs::from("com", "Cmdlens", "cmdlens")
            && is_writable(dirs.cache_dir())
        {
            let log_dir = dirs.cache_dir().to_path_buf();
            let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(non_blocking).with_ansi(false));

            #[cfg(feature = "opentelemetry")]
            let subscriber = subscriber.with(init_otel());

            if subscriber.try_init().is_ok() {
                // Flushes on drop, so it must live for the whole process.
                Box::leak(Box::new(guard));
                return LogTarget::File(log_dir);
            }
            return LogTarget::Stderr;
        }

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true));

        #[cfg(feature = "opentelemetry")]
        let subscriber = subscriber.with(init_otel());

        // A subscriber installed elsewhere (a test harness) wins.
        let _ = subscriber.try_init();
        LogTarget::Stderr
    });

    Ok(target.clone())
}

#[cfg(feature = "opentelemetry")]
fn init_otel<S>() -> Option<tracing_opentelemetry::OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    if endpoint.is_none() && std::env::var("CMDLENS_TRACING").is_err() {
        return None;
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.unwrap_or_else(|| "http://localhost:4318/v1/traces".to_string()))
        .build()
        .ok()?;

    let provider = SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name("cmdlens").build())
        .with_batch_exporter(exporter)
        .build();

    Some(tracing_opentelemetry::layer().with_tracer(provider.tracer("cmdlens")))
}

/// `tracing_appender::rolling::daily` panics on an unwritable directory, so
/// probe it first.
fn is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".cmdlens_write_probe");
    let ok = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_writable(&dir.path().join("nested/logs")));
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = init_logging("debug", false).unwrap();
        let second = init_logging("trace", true).unwrap();
        assert_eq!(first, second);
    }
}
