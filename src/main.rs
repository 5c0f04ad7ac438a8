//! edge-relay: backend-health daemon of the reverse proxy.
//!
//! Loads the cluster configuration, starts the health subsystem, watches
//! the config file for changes, and shuts down cleanly on SIGINT/SIGTERM.

use clap::Parser;
use edge_relay::config::loader::load_config;
use edge_relay::config::watcher::ConfigWatcher;
use edge_relay::health::policy::PolicyRegistry;
use edge_relay::health::transport::HttpProbeTransport;
use edge_relay::health::HealthCheckSystem;
use edge_relay::lifecycle::{signals, Shutdown};
use edge_relay::observability::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "edge-relay", about = "Reverse proxy backend-health daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let registry = Arc::new(PolicyRegistry::default());
    let config = load_config(&args.config, &registry)?;

    logging::init_logging(&config.observability);
    tracing::info!(path = ?args.config, clusters = config.clusters.len(), "Configuration loaded");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = Arc::new(HttpProbeTransport::new());
    let system = Arc::new(HealthCheckSystem::new(registry.clone(), transport));
    system.apply_config(config).await?;

    let (watcher, mut updates) = ConfigWatcher::new(&args.config, registry);
    let _watcher_guard = watcher.run()?;

    let shutdown = Shutdown::new();
    signals::listen(shutdown.clone());
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        tokio::select! {
            Some(new_config) = updates.recv() => {
                match system.apply_config(new_config).await {
                    Ok(()) => tracing::info!("Configuration snapshot applied"),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Rejected configuration snapshot, keeping current"
                    ),
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    system.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
