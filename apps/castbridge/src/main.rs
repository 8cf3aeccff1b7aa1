//! Castbridge - native companion process for the Cast browser extension.
//!
//! Launched by the browser as a native messaging host (the default), or run
//! as a local WebSocket daemon the extension connects to. Either way the
//! process owns every connection to Cast receivers on the extension's behalf.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use castbridge_core::{
    bind_daemon, bootstrap_services, run_native_host, serve_daemon, BootstrappedServices,
    DaemonState,
};
use clap::Parser;
use tokio::signal;

use crate::config::{BridgeConfig, Mode};

/// Castbridge - lets a browser extension discover and control Cast receivers.
#[derive(Parser, Debug)]
#[command(name = "castbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "CASTBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). Logs go to stderr.
    #[arg(short, long, default_value = "info", env = "CASTBRIDGE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Extension channel (overrides config file and environment).
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Daemon bind port (overrides config file and environment).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Disable mDNS discovery.
    #[arg(long)]
    no_discovery: bool,

    /// Arguments the browser appends when launching a native host (caller
    /// origin, parent window handle). Accepted and ignored.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    browser_args: Vec<String>,
}

impl Args {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(port) = self.port {
            config.bind_port = port;
        }
        if self.no_discovery {
            config.discovery_mdns = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries native messaging frames, so logs must stay on stderr.
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Castbridge v{}", env!("CARGO_PKG_VERSION"));
    if !args.browser_args.is_empty() {
        log::debug!("Launched by browser with {:?}", args.browser_args);
    }

    let mut config =
        BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    log::info!(
        "Configuration: mode={:?}, bind_port={}, discovery_mdns={}",
        config.mode,
        config.bind_port,
        config.discovery_mdns
    );

    let services =
        bootstrap_services(&config.to_core_config()).context("Failed to bootstrap services")?;

    match config.mode {
        Mode::Native => run_native(&services).await,
        Mode::Daemon => run_daemon(&services, config.bind_port).await,
    }
}

async fn run_native(services: &BootstrappedServices) -> Result<()> {
    let cancel = services.cancel_token.clone();
    let signals = tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received");
        cancel.cancel();
    });

    let result = run_native_host(
        services.context(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        services.cancel_token.clone(),
    )
    .await;

    let interrupted = services.cancel_token.is_cancelled();
    signals.abort();
    services.shutdown();
    result.context("Native messaging channel failed")?;

    if interrupted {
        // A pending stdin read would otherwise hold the runtime open.
        std::process::exit(0);
    }
    Ok(())
}

async fn run_daemon(services: &BootstrappedServices, port: u16) -> Result<()> {
    let (listener, addr) = bind_daemon(port)
        .await
        .with_context(|| format!("Failed to start daemon on port {}", port))?;

    let state = DaemonState::new(services.context());
    let server = tokio::spawn(serve_daemon(listener, state, services.cancel_token.clone()));
    log::info!("Daemon started on {}", addr);

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");
    services.shutdown();

    server
        .await
        .context("Daemon task panicked")?
        .context("Daemon failed")?;
    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
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
