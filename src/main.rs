//! service-core
//!
//! Runs a single HTTP service under a lifecycle controller.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ load + validate ──▶ ConfigStore (hot reload) ──▶ log level
//!                                            │
//!                                            ▼
//!   Router (/health) ──▶ ServiceHandle ──▶ LifecycleController ──▶ serve task
//!                                            ▲         │
//!                                            │         └──────────▶ watcher task
//!   SIGINT / SIGTERM ──▶ SignalBridge ───────┘ stop(deadline)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use service_core::config::{load_config, AppConfig, ConfigStore, ConfigWatcher};
use service_core::http::{health_router, ServiceHandle};
use service_core::lifecycle::{LifecycleController, SignalBridge};
use service_core::observability::{init_logging, metrics, LogLevel, TracingSink};

#[derive(Parser)]
#[command(name = "service-core")]
#[command(about = "Run an HTTP service with graceful start/stop", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(address) = cli.address {
        config.service.address = address;
    }

    let log_handle = init_logging(&config.logging)?;
    tracing::info!("service-core v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        service = %config.service.name,
        address = %config.service.address,
        shutdown_timeout_secs = config.service.shutdown_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = ConfigStore::new(config.clone());
    let mut levels = store.subscribe(|c| LogLevel::parse(&c.logging.level));
    tokio::spawn(async move {
        while levels.changed().await.is_ok() {
            let level = *levels.borrow_and_update();
            if let Err(e) = log_handle.set_level(level) {
                tracing::error!(error = %e, "Failed to apply reloaded log level");
            }
        }
    });
    let _watcher = match &cli.config {
        Some(path) => Some(ConfigWatcher::new(path, store.clone()).run()?),
        None => None,
    };

    let deadline = config.service.shutdown_timeout();
    let handle = ServiceHandle::new(config.service, health_router())?;
    let controller = LifecycleController::new(handle, TracingSink::shared());

    // OS signals are the only shutdown trigger for the standalone binary.
    controller.start(std::future::pending()).await?;

    let bridge = SignalBridge::new(controller.clone(), deadline);
    bridge.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
