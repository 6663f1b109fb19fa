use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, error, info};
use tracker_gateway::gateway_config::GatewayConfig;
use tracker_gateway::tracker::{GatewayServer, TracingObserver};
use tracker_gateway::web::{self, AppState};

pub async fn handle_serve(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    tcp_port: Option<u16>,
    http_port: Option<u16>,
) -> Result<()> {
    let mut config = GatewayConfig::load_or_default(config_path.as_deref())
        .context("Failed to load gateway config")?;

    // Command line flags override the config file
    if let Some(bind) = bind {
        config.bind_address = bind;
    }
    if let Some(port) = tcp_port {
        config.tcp_port = port;
    }
    if let Some(port) = http_port {
        config.http_port = port;
    }
    config.validate()?;

    info!(
        "Starting tracker gateway - devices on {}, HTTP on {}",
        config.tcp_addr(),
        config.http_addr()
    );

    // Metrics must exist before the first scrape
    let metrics_handle = tracker_gateway::metrics::init_metrics()?;
    tracker_gateway::metrics::initialize_gateway_metrics();
    tokio::spawn(
        tracker_gateway::metrics::process_metrics_task()
            .instrument(tracing::info_span!("process_metrics")),
    );

    let server = GatewayServer::bind(
        &config.tcp_addr(),
        config.session_settings(),
        Arc::new(TracingObserver),
    )
    .await?;

    let state = AppState::new(config.tcp_port, config.http_port, Some(metrics_handle));
    let http_addr = config.http_addr();

    tokio::select! {
        result = server.run() => {
            result.context("Tracker gateway stopped")?;
        }
        result = web::start_web_server(&http_addr, state) => {
            result?;
        }
        signal = shutdown_signal() => {
            match signal {
                Ok(name) => info!("Received {}, shutting down", name),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM and return its name
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => Ok("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT (Ctrl+C)"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        Ok("SIGINT (Ctrl+C)")
    }
}
