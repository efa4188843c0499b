//! Adapters layer: ledger gateways and the bus-backed messenger.

pub mod bus_messenger;
pub mod memory_ledger;
pub mod sqlite_ledger;

pub use bus_messenger::BusMessenger;
pub use memory_ledger::InMemoryLedger;
pub use sqlite_ledger::{SqliteLedgerGateway, LEDGER_SCHEMA};
