//! HEOS Relay Server - headless relay for HEOS control.
//!
//! Holds the control connection to a HEOS device, streams every event to
//! attached clients over SSE and accepts commands over plain HTTP.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use heos_relay_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// HEOS Relay Server - multiplexes one HEOS control connection to many clients.
#[derive(Parser, Debug)]
#[command(name = "heos-relay-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "HEOS_RELAY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "HEOS_RELAY_BIND_PORT")]
    port: Option<u16>,

    /// HEOS device address (overrides config file; disables discovery).
    #[arg(short = 'H', long, env = "HEOS_RELAY_HEOS_HOST")]
    heos_host: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("HEOS Relay Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(host) = args.heos_host {
        config.heos_host = Some(host);
    }

    match config.heos_host {
        Some(host) => log::info!(
            "Configuration: bind_port={}, heos={}:{}",
            config.bind_port,
            host,
            config.heos_port
        ),
        None => log::info!(
            "Configuration: bind_port={}, heos=discover ({}ms)",
            config.bind_port,
            config.discovery_timeout_ms
        ),
    }

    let services = bootstrap_services(&config.to_core_config())
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let supervisor = services.start_background_tasks();

    log::info!("Background tasks started");

    let app_state = AppState::new(&services);
    let server_shutdown = services.cancel_token.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, server_shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", config.bind_port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown();

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }
    if let Err(e) = supervisor.await {
        log::warn!("Supervisor task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
