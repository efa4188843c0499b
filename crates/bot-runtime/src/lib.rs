//! # Poll Bot Runtime
//!
//! Wires the poll engine, the chat bus and the wallet bridge into a running
//! bot.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, environment overrides, validation)
//! 2. Initialize telemetry
//! 3. Open the ledger database read only
//! 4. Start the chat dispatcher and the session cleanup task
//! 5. Bridge stdin/stdout to the bus until EOF or Ctrl+C
//!
//! ## Shutdown
//!
//! A `watch` channel signals every background task. The dispatcher hands
//! over the events already on the bus and waits for its device workers, so
//! every message read before shutdown gets its reply published.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod container;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use poll_engine::domain::cleanup_task;

pub use container::{BotConfig, BotContainer, ConfigError};
pub use handlers::ChatDispatcher;

/// Grace period for each background task after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The running poll bot.
pub struct BotRuntime {
    container: Arc<BotContainer>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl BotRuntime {
    pub fn new(container: BotContainer) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            container: Arc::new(container),
            shutdown_tx,
            shutdown_rx,
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the dispatcher and the session cleanup task.
    pub fn start(&self) {
        info!(
            device_name = %self.container.config.device_name,
            "Starting poll bot"
        );

        let dispatcher = ChatDispatcher::new(
            Arc::clone(&self.container.api),
            &self.container.bus,
            self.container.config.worker_idle(),
        );
        let dispatcher_handle = tokio::spawn(dispatcher.run(self.shutdown_rx.clone()));

        let sessions = Arc::clone(&self.container.sessions);
        let interval = self.container.config.session_cleanup_interval();
        let mut cleanup_shutdown = self.shutdown_rx.clone();
        let cleanup_handle = tokio::spawn(async move {
            tokio::select! {
                _ = cleanup_task(sessions, interval) => {}
                _ = cleanup_shutdown.changed() => {
                    info!("Session cleanup shutting down");
                }
            }
        });

        let mut handles = self.handles.lock();
        handles.push(dispatcher_handle);
        handles.push(cleanup_handle);
        info!("Poll bot started");
    }

    /// Signal shutdown and wait for the background tasks.
    ///
    /// Returns once every inbound event published before the call has been
    /// handled, or the grace period ran out.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            warn!("No task listening for shutdown: {}", e);
        }

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Background task failed: {}", e),
                Err(_) => warn!("Background task did not stop in time"),
            }
        }

        info!("Shutdown complete");
    }

    /// Get a reference to the container.
    pub fn container(&self) -> Arc<BotContainer> {
        Arc::clone(&self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poll_engine::InMemoryLedger;

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let container = BotContainer::with_ledger(BotConfig::default(), Arc::new(InMemoryLedger::new()));
        let runtime = BotRuntime::new(container);
        runtime.start();
        assert_eq!(runtime.container().bus.subscriber_count(), 1);

        runtime.shutdown().await;
        assert!(runtime.handles.lock().is_empty());
    }
}
