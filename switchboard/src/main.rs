#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::sync::Arc;

use args::Args;
use clap::Parser;
use switchboard_config::Config;
use switchboard_server::Server;
use switchboard_telemetry::OtelTelemetry;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let telemetry_guard = switchboard_telemetry::init(config.telemetry.as_ref(), &args.log)?;
    let telemetry = Arc::new(OtelTelemetry::new(&telemetry_guard.meter()));

    tracing::info!(
        config_path = %args.config.display(),
        exports_metrics = telemetry_guard.exports_metrics(),
        "starting switchboard"
    );

    let mut server = Box::pin(Server::new(config, telemetry)).await?;
    if let Some(listen) = args.listen {
        server.set_listen_address(listen);
    }

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("switchboard stopped");
    Ok(())
}

/// Wait for `SIGINT` or `SIGTERM`
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
