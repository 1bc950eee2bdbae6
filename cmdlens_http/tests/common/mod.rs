//! Shared helpers for the HTTP route tests.
//!
//! - `MockBackend`: a tiny axum app serving `/api/generate` as NDJSON.
//! - `FakeRunner` / `FakeExplainer`: deterministic stand-ins for the executor
//!   and the backend explainer.
//! - `state`: assemble an `AppState` from the pieces above.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use cmdlens_core::allowlist::{Allowlist, CommandUnit, default_entries};
use cmdlens_core::explainer::{BackendClient, ExplainContext, ExplainError, Explainer, PromptTemplate};
use cmdlens_core::orchestrator::{OrchestratorSettings, RequestOrchestrator};
use cmdlens_core::sandbox::{CommandRunner, ExecutionResult};
use cmdlens_http::AppState;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Serves every generate request with the same fragments, then a done record.
pub struct MockBackend {
    url: Url,
    task: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn fragments(pieces: &[&str]) -> Self {
        let pieces: Arc<Vec<String>> = Arc::new(pieces.iter().map(|p| p.to_string()).collect());
        let app = Router::new()
            .route("/api/generate", post(generate))
            .with_state(pieces);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            task,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn generate(State(pieces): State<Arc<Vec<String>>>) -> Response {
    let mut lines: Vec<Result<String, Infallible>> = pieces
        .iter()
        .map(|text| {
            let record = serde_json::json!({"model": "llama3", "response": text, "done": false});
            Ok(format!("{record}\n"))
        })
        .collect();
    let done = serde_json::json!({"model": "llama3", "response": "", "done": true});
    lines.push(Ok(format!("{done}\n")));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(futures::stream::iter(lines)),
    )
        .into_response()
}

/// A URL nothing is listening on.
pub async fn refused_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// Prints `output of <command>`, optionally after a delay.
#[derive(Default)]
pub struct FakeRunner {
    pub delay: Option<Duration>,
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, unit: &CommandUnit) -> ExecutionResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        ExecutionResult {
            unit: unit.clone(),
            exit_code: Some(0),
            stdout: format!("output of {}\n", unit.trimmed()),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
            spawn_error: None,
            timeout_ms: 5000,
        }
    }
}

/// Explains every command as healthy.
pub struct FakeExplainer;

#[async_trait]
impl Explainer for FakeExplainer {
    async fn explain(
        &self,
        template: PromptTemplate,
        context: &ExplainContext,
    ) -> Result<String, ExplainError> {
        Ok(match template {
            PromptTemplate::Explain => format!("explained {}", context.command),
            PromptTemplate::HealthSeverity => format!("✅ {} looks fine", context.command),
        })
    }
}

pub struct StateBuilder {
    runner: FakeRunner,
    backend_url: Url,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

/// Default allowlist and probes, the fakes, and a backend at `backend_url`.
pub fn state(backend_url: &Url) -> StateBuilder {
    StateBuilder {
        runner: FakeRunner::default(),
        backend_url: backend_url.clone(),
        request_timeout: Duration::from_secs(10),
        shutdown: CancellationToken::new(),
    }
}

impl StateBuilder {
    pub fn runner_delay(mut self, delay: Duration) -> Self {
        self.runner.delay = Some(delay);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Arc<AppState> {
        let client = BackendClient::new(
            &self.backend_url,
            "llama3",
            Duration::from_secs(2),
            Duration::from_secs(5),
        )
        .unwrap();
        let orchestrator = RequestOrchestrator::new(
            Arc::new(Allowlist::new(default_entries())),
            Arc::new(self.runner),
            Arc::new(FakeExplainer),
            OrchestratorSettings::default(),
        );
        Arc::new(AppState::new(
            orchestrator,
            client,
            self.request_timeout,
            self.shutdown,
        ))
    }
}
