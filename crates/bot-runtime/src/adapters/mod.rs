//! # Adapters
//!
//! Connections between the bot and the wallet process.

pub mod stdio_bridge;

pub use stdio_bridge::{parse_inbound_line, pump_inbound, pump_outbound, InboundLine};
