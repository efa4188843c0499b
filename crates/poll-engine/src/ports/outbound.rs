//! Outbound Ports (Driven Ports)
//!
//! Dependencies the poll bot needs from the outside world: read access to
//! the ledger, a way to send chat messages, and a clock.

use async_trait::async_trait;
use shared_types::entities::{Address, DeviceAddress, UnitId};
use std::collections::HashMap;

use crate::domain::entities::{AttestedVoteRow, PollSummary, VoteRow, VoteSequence};
use crate::domain::errors::PollBotError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Read-only view of the ledger's poll, vote, output and attestation data.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Polls among `units` that exist, newest first.
    async fn whitelisted_polls(&self, units: &[UnitId]) -> Result<Vec<PollSummary>, PollBotError>;

    /// Question of the poll defined by `unit`, if any.
    async fn question(&self, unit: &UnitId) -> Result<Option<String>, PollBotError>;

    /// Choices of the poll in their defined order.
    async fn choices(&self, unit: &UnitId) -> Result<Vec<String>, PollBotError>;

    /// Every vote on the poll, one row per author address, in ledger order.
    async fn vote_rows(&self, poll_unit: &UnitId) -> Result<Vec<VoteRow>, PollBotError>;

    /// Unspent native-token balance of each address. Addresses without
    /// outputs may be absent.
    async fn native_balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, u64>, PollBotError>;

    /// Votes whose author carries a `user_id` attestation from one of
    /// `attestors`. An address attested twice yields one row per user id.
    async fn attested_vote_rows(
        &self,
        poll_unit: &UnitId,
        attestors: &[Address],
    ) -> Result<Vec<AttestedVoteRow>, PollBotError>;

    /// Sequence of the newest vote on the poll, `None` without votes.
    async fn latest_vote_sequence(
        &self,
        poll_unit: &UnitId,
    ) -> Result<Option<VoteSequence>, PollBotError>;
}

/// Sends chat text to a paired device.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, device: &DeviceAddress, body: String) -> Result<(), PollBotError>;
}

/// Time source for session expiry.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: std::sync::atomic::AtomicU64,
}

impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: std::sync::atomic::AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, time: Timestamp) {
        self.time.store(time, std::sync::atomic::Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(std::sync::atomic::Ordering::SeqCst)
    }
}
