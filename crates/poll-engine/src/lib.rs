//! # Poll Engine
//!
//! Core of the poll bot: turns chat text from paired wallet devices into
//! poll lists, choice menus and vote tallies read from the ledger.
//!
//! ## Commands
//!
//! | Text | Reply |
//! |------|-------|
//! | `polls`, `0000`, `*` | whitelisted polls, newest first |
//! | question or question prefix | choice menu with `vote:` links |
//! | `poll[-UNIT]` | choice menu |
//! | `stats[-UNIT]` | results weighted by unspent balance |
//! | `attested`/`steem`/`email[-UNIT]` | results counted per attested user |
//! | `voted:…` | balance results once the new vote is visible |
//!
//! Commands without a unit refer to the poll the device looked at last.
//!
//! ## Tally Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | One effective vote per address / attested user | `domain/tally.rs` - `effective_votes()` |
//! | Every defined choice appears, zero-filled | `domain/tally.rs` - `group_by_choice()` |
//! | Exact integer balance arithmetic | `domain/tally.rs` - `tally_by_balance()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - SQLite + in-memory ledgers, bus messenger          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - PollBotApi trait                           │
//! │  ports/outbound.rs - LedgerGateway, MessagingGateway, TimeSource│
//! │  service/          - PollBotService                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/command.rs - chat grammar                               │
//! │  domain/tally.rs   - last-vote-wins tallies                     │
//! │  domain/format.rs  - reply templates                            │
//! │  domain/session.rs - per-device selection with TTL              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{BusMessenger, InMemoryLedger, SqliteLedgerGateway};
pub use domain::{
    AttestationPolicy, AttestorSets, Command, CommandParser, PollBotError, SessionStore,
};
pub use ports::{
    LedgerGateway, MessagingGateway, Outcome, PollBotApi, ReplyKind, SystemTimeSource, TimeSource,
};
pub use service::{PollBotService, PollBotSettings};
