//! Prometheus exporter for Klipper printers.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use klipper_exporter::{ExporterConfig, HttpServer, MoonrakerClient, ProbeSettings, SnapshotCollector};

/// Prometheus exporter for Klipper printers, scraped through Moonraker.
#[derive(Parser, Debug)]
#[command(name = "klipper-exporter")]
#[command(about = "Export Klipper printer metrics from Moonraker as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long = "web.listen-address")]
    listen_address: Option<String>,

    /// Moonraker API key used when a probe request carries none.
    #[arg(long = "moonraker.apikey", env = "MOONRAKER_APIKEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Enable trace logging.
    #[arg(long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Log level requested on the command line, if any.
    fn log_level(&self) -> Option<&str> {
        if self.verbose {
            Some("trace")
        } else if self.debug {
            Some("debug")
        } else {
            self.log_level.as_deref()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(listen) = &args.listen_address {
        config.http.listen = listen.clone();
    }
    if let Some(level) = args.log_level() {
        config.logging.level = level.to_string();
    }
    config.validate()?;

    klipper_common::init_tracing(&config.logging)?;

    info!("Starting Klipper Exporter");

    let api_key = args
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .or_else(|| config.moonraker.api_key.clone());
    if api_key.is_none() {
        warn!("No Moonraker API key configured, relying on probe request headers");
    }

    let client = MoonrakerClient::new(config.moonraker.timeout())
        .map_err(|e| anyhow::anyhow!("Failed to create Moonraker client: {}", e))?;
    let collector = Arc::new(SnapshotCollector::new(client));

    let settings = ProbeSettings {
        default_modules: config.moonraker.default_module_set(),
        api_key,
    };
    info!(
        default_modules = %settings.default_modules,
        timeout_secs = config.moonraker.timeout_secs,
        "Moonraker client ready"
    );

    let listen_addr = config.listen_addr()?;
    let http_server = HttpServer::new(collector.clone(), settings, listen_addr, &config.http);

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = &mut http_task => {
            warn!("HTTP server exited unexpectedly");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true).ok();

    if !http_task.is_finished() {
        let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;
    }

    let stats = collector.stats();
    info!(
        probes = stats.probes,
        module_errors = stats.module_errors,
        discovered_targets = collector.discovered_targets(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
