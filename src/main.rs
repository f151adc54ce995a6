//! CLI Entry Point for beckhoff-bridge
//!
//! Loads the bridge configuration, starts one runtime per configured PLC and
//! logs the data and status events they produce until Ctrl-C (or for a fixed
//! time with `--run-for`).
//!
//! PLCs are served by the simulated driver from `bridge-driver-mock`; seed
//! their symbols under `[plcs.driver]`.
//!
//! # Usage
//!
//! ```bash
//! beckhoff-bridge --config config/bridge.toml
//! beckhoff-bridge --log-level debug --run-for 10
//! ```

use anyhow::{Context, Result};
use beckhoff_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use beckhoff_bridge::{logging, RuntimeRegistry, StatusHistory};
use bridge_core::{BridgeEvent, BridgeEventKind, DriverFactory, EventSink, FanOut};
use bridge_driver_mock::MockPlcFactory;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "beckhoff-bridge")]
#[command(about = "Cyclic read/write bridge for Beckhoff PLCs", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    logging::init_from_config(&config)
        .map_err(anyhow::Error::msg)
        .context("initializing tracing")?;

    info!(name = %config.application.name, "starting");

    let (events, rx) = broadcast::channel::<BridgeEvent>(1024);
    let history = Arc::new(StatusHistory::default());
    let sink = FanOut::new()
        .with(Arc::new(events))
        .with(history.clone() as Arc<dyn EventSink>);

    let factory: Arc<dyn DriverFactory> = Arc::new(MockPlcFactory::new());
    let registry = RuntimeRegistry::from_config(&config, factory, Arc::new(sink))
        .context("starting PLC runtimes")?;

    let logger = tokio::spawn(log_events(rx));

    match cli.run_for {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
        }
    }

    info!("shutting down");
    for name in registry.names() {
        let recent = history.recent(&name);
        if !recent.is_empty() {
            info!(plc = %name, statuses = recent.len(), "recent status messages at shutdown");
        }
    }
    registry.clear().await;
    logger.abort();
    Ok(())
}

async fn log_events(mut rx: broadcast::Receiver<BridgeEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event.kind {
                BridgeEventKind::Data(tree) => {
                    info!(plc = %event.plc, data = %tree.to_json(), "data");
                }
                BridgeEventKind::Status(status) => {
                    warn!(plc = %event.plc, "{}", status.message);
                }
                BridgeEventKind::Lifecycle(lifecycle) => {
                    info!(plc = %event.plc, "{}", lifecycle);
                }
                BridgeEventKind::Enabled(enabled) => {
                    debug!(plc = %event.plc, enabled, "enabled changed");
                }
                BridgeEventKind::Initialized => {
                    debug!(plc = %event.plc, "initialized");
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
