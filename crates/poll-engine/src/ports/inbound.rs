//! Inbound Ports (Driving Ports)
//!
//! What the chat runtime calls for every event from a paired device.

use async_trait::async_trait;
use shared_types::entities::DeviceAddress;

use crate::domain::entities::AttestationPolicy;
use crate::domain::errors::PollBotError;

/// Kind of reply that was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    PollList,
    ChoiceMenu,
    BalanceResults { stale: bool },
    AttestedResults { policy: AttestationPolicy },
    MalformedPoll,
    Ambiguous,
}

impl ReplyKind {
    /// Metric label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PollList => "poll_list",
            Self::ChoiceMenu => "choice_menu",
            Self::BalanceResults { .. } => "balance_results",
            Self::AttestedResults { .. } => "attested_results",
            Self::MalformedPoll => "malformed_poll",
            Self::Ambiguous => "ambiguous",
        }
    }
}

/// Result of handling one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was sent.
    Ignored,
    /// Exactly one reply was sent.
    Replied { kind: ReplyKind },
}

/// Primary poll bot API (Driving Port)
#[async_trait]
pub trait PollBotApi: Send + Sync {
    /// Handle a text message from `device`.
    ///
    /// # Errors
    /// Ledger or delivery failures. Unknown units, polls without choices and
    /// ambiguous questions are answered, not returned as errors.
    async fn handle_text(&self, device: &DeviceAddress, text: &str)
        -> Result<Outcome, PollBotError>;

    /// Handle a new pairing with `device`: greet it with the poll list.
    async fn handle_paired(&self, device: &DeviceAddress) -> Result<Outcome, PollBotError>;
}
