//! HTTP server setup: shared state, router and the serve loop.

use crate::error::{Result, ServerError};
use crate::handlers::{chat, explain, health, list_commands};
use axum::{
    Router,
    routing::{get, post},
};
use cmdlens_core::{BackendClient, GatewayConfig, RequestOrchestrator};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind (e.g. `127.0.0.1:8000`). Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    pub gateway: GatewayConfig,
}

/// State shared by all handlers.
pub struct AppState {
    pub orchestrator: RequestOrchestrator,
    /// Backend handle for free-form generation; shares the orchestrator's pool.
    pub client: BackendClient,
    /// Bound on one whole request.
    pub request_timeout: Duration,
    /// Cancelled on shutdown; every request works under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        orchestrator: RequestOrchestrator,
        client: BackendClient,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            client,
            request_timeout,
            shutdown,
        }
    }

    /// Build every long-lived component from the configuration.
    pub fn from_config(config: &GatewayConfig, shutdown: CancellationToken) -> Result<Self> {
        let client = config.backend_client()?;
        let orchestrator = config.build_orchestrator(client.clone())?;
        Ok(Self::new(
            orchestrator,
            client,
            config.request_timeout,
            shutdown,
        ))
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/explain", post(explain))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/commands", get(list_commands))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` is cancelled.
///
/// In-flight requests see the cancellation and answer 503; the server then
/// waits for their responses before returning.
pub async fn start_server(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config.gateway, shutdown.clone())?);

    if !config.bind_addr.ip().is_loopback() {
        warn!(
            "Bound to non-loopback address {}. There is no authentication; restrict access via firewall or reverse proxy.",
            config.bind_addr
        );
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| ServerError::HttpServer(format!("Failed to bind: {}", e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::HttpServer(format!("Failed to get local addr: {}", e)))?;

    info!("cmdlens listening on http://{}", local_addr);
    info!(
        "Backend: {} (model {})",
        state.client.generate_url(),
        state.client.model()
    );
    info!(
        "Allowlist: {} commands, {} health probes",
        state.orchestrator.allowlist().len(),
        state.orchestrator.settings().probes.len()
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ServerError::HttpServer(format!("Server error: {}", e)))?;

    info!("cmdlens stopped");
    Ok(())
}
