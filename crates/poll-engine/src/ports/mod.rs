//! Ports layer for the poll bot.
//!
//! - Inbound (Driving) ports: API the chat runtime calls
//! - Outbound (Driven) ports: ledger, messaging and clock dependencies

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
