//! # Service Container
//!
//! Wires the poll engine to its adapters:
//!
//! ```text
//! BotConfig ──→ SessionStore (SystemTimeSource, ttl)
//!          ──→ LedgerGateway (SQLite, read only)
//!          ──→ BusMessenger (InMemoryEventBus)
//!          ──→ PollBotService ──→ Arc<dyn PollBotApi>
//! ```
//!
//! The bus is the only path between the chat bridge and the service.

use std::sync::Arc;

use tracing::{info, instrument};

use poll_engine::domain::SessionStore;
use poll_engine::{
    BusMessenger, LedgerGateway, PollBotApi, PollBotError, PollBotService, SqliteLedgerGateway,
    SystemTimeSource,
};
use shared_bus::{EventPublisher, InMemoryEventBus};

use crate::container::config::BotConfig;

/// Holds the shared instances for the lifetime of the bot.
pub struct BotContainer {
    pub config: BotConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub sessions: Arc<SessionStore>,
    pub api: Arc<dyn PollBotApi>,
}

impl BotContainer {
    /// Open the ledger database named in `config` and wire everything to it.
    ///
    /// # Errors
    /// The database cannot be opened.
    #[instrument(skip(config), fields(db = %config.ledger.database_path.display()))]
    pub fn open(config: BotConfig) -> Result<Self, PollBotError> {
        let ledger = Arc::new(SqliteLedgerGateway::open_read_only(
            &config.ledger.database_path,
        )?);
        info!("Ledger database opened");
        Ok(Self::with_ledger(config, ledger))
    }

    /// Wire the bot against an already constructed ledger.
    pub fn with_ledger<L>(config: BotConfig, ledger: Arc<L>) -> Self
    where
        L: LedgerGateway + 'static,
    {
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus.channel_capacity));
        let sessions = Arc::new(SessionStore::new(
            config.session_ttl(),
            Arc::new(SystemTimeSource),
        ));

        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let messenger = Arc::new(BusMessenger::new(publisher));
        let service = PollBotService::new(
            ledger,
            messenger,
            Arc::clone(&sessions),
            config.poll_settings(),
        );

        info!(
            device_name = %config.device_name,
            polls = config.polls.whitelist.len(),
            max_text_chars = config.limits.max_text_chars,
            "Poll bot services wired"
        );

        Self {
            config,
            bus,
            sessions,
            api: Arc::new(service),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poll_engine::InMemoryLedger;

    #[test]
    fn test_open_missing_database_fails() {
        let mut config = BotConfig::default();
        config.ledger.database_path = "/nonexistent/dir/byteball.sqlite".into();
        assert!(matches!(
            BotContainer::open(config),
            Err(PollBotError::Ledger(_))
        ));
    }

    #[test]
    fn test_with_ledger_uses_configured_capacity() {
        let mut config = BotConfig::default();
        config.bus.channel_capacity = 16;
        let container = BotContainer::with_ledger(config, Arc::new(InMemoryLedger::new()));
        assert_eq!(container.bus.capacity(), 16);
        assert!(container.sessions.is_empty());
    }
}
