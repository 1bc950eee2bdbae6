use anyhow::Context;
use clap::Parser;
use cmdlens_core::utils::logging::{LogTarget, init_logging};
use cmdlens_http::{cli::Args, start_server};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let target = init_logging(&args.log_level, args.log_to_file)?;
    if let LogTarget::File(dir) = &target {
        eprintln!("cmdlens logging to {}", dir.display());
    }

    let config = match args.into_server_config().await {
        Ok(config) => config,
        Err(e) => {
            let fatal = cmdlens_core::GatewayError::from(e);
            tracing::error!("{}", fatal);
            return Err(fatal.into());
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    start_server(config, shutdown)
        .await
        .map_err(|e| e.into_gateway_error())
        .context("cmdlens failed")?;
    Ok(())
}

/// Cancel `token` on Ctrl-C or, on unix, SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown requested, finishing in-flight requests");
    token.cancel();
}
