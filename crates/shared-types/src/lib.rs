//! # Shared Types Crate
//!
//! Identifier types that cross crate boundaries: the poll engine, the chat
//! event bus and the runtime all speak in terms of these.
//!
//! ## Design Principles
//!
//! - **Newtypes over strings**: a device address can never be passed where a
//!   ledger address or a poll unit is expected.
//! - **Opaque values**: identifiers are compared and printed, never parsed.

pub mod entities;

pub use entities::*;
