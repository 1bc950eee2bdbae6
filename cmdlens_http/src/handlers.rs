//! Route handlers.
//!
//! `/explain` and `/health` always answer 200 with one entry per unit; unit
//! failures are part of the body. Only shutdown (503) and the request
//! deadline (504) fail a whole request.

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use cmdlens_core::{AggregateResponse, AllowlistEntry, Severity, UnitSet};
use futures::{StreamExt, future};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explanations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    /// `ok` when the probe ran and exited 0, `error` otherwise.
    pub status: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub health_report: BTreeMap<String, HealthEntry>,
    pub summary: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandsResponse<'a> {
    pub commands: &'a [AllowlistEntry],
}

/// Run the orchestrator under the shutdown token and the request deadline.
async fn run_bounded(
    state: &AppState,
    directive: &str,
    unit_set: UnitSet,
) -> Result<AggregateResponse, ApiError> {
    let token = state.shutdown.child_token();
    let work = state
        .orchestrator
        .process_with_cancellation(directive, unit_set, &token);

    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            token.cancel();
            tracing::warn!(
                "Request exceeded deadline of {:?}, abandoning it",
                state.request_timeout
            );
            Err(ApiError::DeadlineExceeded(state.request_timeout))
        }
    }
}

/// `POST /explain`: validate, run and explain each unit of a directive.
pub async fn explain(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExplainRequest>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let span = tracing::info_span!("explain", request_id = %Uuid::new_v4());
    async move {
        let response = run_bounded(&state, &request.command, UnitSet::UserSupplied).await?;
        Ok(Json(ExplainResponse {
            explanations: response.explanations(),
        }))
    }
    .instrument(span)
    .await
}

/// `GET /health`: run the configured probes with the severity prompt.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let span = tracing::info_span!("health", request_id = %Uuid::new_v4());
    async move {
        let response = run_bounded(&state, "", UnitSet::FixedProbeSet).await?;
        Ok(Json(health_response(&response)))
    }
    .instrument(span)
    .await
}

fn health_response(response: &AggregateResponse) -> HealthResponse {
    let health_report = response
        .outcomes
        .iter()
        .map(|outcome| {
            let status = if outcome.executed_ok() { "ok" } else { "error" };
            let output = outcome
                .raw_output
                .clone()
                .or_else(|| outcome.failure_message())
                .unwrap_or_default();
            let entry = HealthEntry {
                status: status.to_string(),
                output,
                severity: outcome.severity,
            };
            (outcome.label().to_string(), entry)
        })
        .collect();

    HealthResponse {
        health_report,
        summary: response.summary_lines(),
    }
}

/// `POST /chat`: forward a prompt and stream the generated text back as it decodes.
pub async fn chat(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    let stream = match state
        .client
        .stream_text(&request.prompt)
        .instrument(span.clone())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            span.in_scope(|| tracing::warn!("Chat backend unavailable: {}", e));
            return (StatusCode::BAD_GATEWAY, format!("{e}\n")).into_response();
        }
    };

    let body = stream
        .take_until(state.shutdown.clone().cancelled_owned())
        .take_while(move |piece| {
            if let Err(e) = piece {
                span.in_scope(|| tracing::warn!("Chat stream ended early: {}", e));
            }
            future::ready(piece.is_ok())
        })
        .filter_map(|piece| future::ready(piece.ok()))
        .map(|text| Ok::<_, Infallible>(Bytes::from(text)));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

/// `GET /commands`: the allowlist with descriptions.
pub async fn list_commands(State(state): State<Arc<AppState>>) -> Response {
    Json(CommandsResponse {
        commands: state.orchestrator.allowlist().entries(),
    })
    .into_response()
}
