//! # cmdlens HTTP service
//!
//! Exposes the gateway in `cmdlens_core` over HTTP:
//!
//! *   `POST /explain` takes `{"command": "..."}`, splits it on the delimiter,
//!     runs each allowlisted unit and returns one explanation line per unit.
//! *   `GET /health` runs the fixed probe set and asks the backend to grade
//!     each result.
//! *   `POST /chat` forwards a free-form prompt and streams the generated text
//!     back as plain text while it decodes.
//! *   `GET /commands` lists the allowlist.
//!
//! There is no authentication. Bind to loopback (the default) or put the
//! service behind something that adds it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cmdlens_core::GatewayConfig;
//! use cmdlens_http::{ServerConfig, start_server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = GatewayConfig::from_backend_url(Some("http://127.0.0.1:11434"))?;
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8000".parse()?,
//!         gateway,
//!     };
//!     start_server(config, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, Result, ServerError};
pub use server::{AppState, ServerConfig, build_router, start_server};
