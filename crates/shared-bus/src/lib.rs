//! # Shared Bus - Chat Event Bus
//!
//! Carries chat traffic between the wallet messaging bridge and the poll
//! engine.
//!
//! ```text
//! ┌──────────────┐   TextReceived    ┌──────────────┐
//! │ Wallet       │ ───────────────→  │ Event Bus    │ ──→ Poll engine
//! │ bridge       │ ←───────────────  │              │ ←── (replies)
//! └──────────────┘   TextOutbound    └──────────────┘
//! ```
//!
//! Subscribers filter by topic (inbound/outbound) and optionally by device.
//! Delivery is best effort: a lagging subscriber loses the oldest events.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{ChatEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::Subscription;

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
