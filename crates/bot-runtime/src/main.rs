//! # Poll Bot
//!
//! Entry point. Reads wallet events as JSON lines on stdin and writes replies
//! as JSON lines on stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```text
//! poll-bot [CONFIG.toml]
//! ```
//!
//! The config path may also come from `POLL_BOT_CONFIG`. Without one the
//! built-in defaults are used.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{debug, error, info};

use bot_runtime::adapters::{pump_inbound, pump_outbound};
use bot_runtime::{BotConfig, BotContainer, BotRuntime};
use bot_telemetry::{init_telemetry, TelemetryConfig};
use shared_bus::{EventFilter, EventTopic};

/// Time given to the reply writer once the runtime has stopped.
const OUTBOUND_DRAIN: Duration = Duration::from_secs(2);

/// Load configuration from the file named on the command line or in
/// `POLL_BOT_CONFIG`, then the environment.
fn load_config() -> Result<BotConfig> {
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("POLL_BOT_CONFIG"))
        .map(PathBuf::from);

    let config = BotConfig::load(path.as_deref(), |name| std::env::var(name).ok())
        .context("failed to load configuration")?;

    match &path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Using default configuration"),
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("failed to initialize telemetry")?;

    let config = load_config()?;
    let container = BotContainer::open(config).context("failed to open ledger database")?;
    let runtime = BotRuntime::new(container);
    let container = runtime.container();

    let outbound = container
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::Outbound]));
    let (outbound_stop, outbound_stop_rx) = watch::channel(false);
    let outbound_task = tokio::spawn(pump_outbound(
        tokio::io::stdout(),
        outbound,
        outbound_stop_rx,
    ));

    runtime.start();
    info!("Poll bot is running. Press Ctrl+C to stop.");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = pump_inbound(stdin, container.bus.as_ref()) => {
            let events = result.context("failed to read wallet events")?;
            info!(events, "Wallet closed the inbound stream");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Ctrl+C received");
        }
    }

    // Every reply is on the bus once the runtime has stopped.
    runtime.shutdown().await;
    if outbound_stop.send(true).is_err() {
        debug!("Outbound writer already stopped");
    }

    match tokio::time::timeout(OUTBOUND_DRAIN, outbound_task).await {
        Ok(Ok(Ok(lines))) => debug!(lines, "Outbound stream closed"),
        Ok(Ok(Err(e))) => error!(error = %e, "Failed to write replies"),
        Ok(Err(e)) => error!(error = %e, "Outbound task failed"),
        Err(_) => debug!("Outbound drain period elapsed"),
    }

    Ok(())
}
