//! Poll engine error types.
//!
//! Only hard failures live here. Not-found units, malformed polls and
//! ambiguous searches are answered with a chat reply instead.

use shared_types::entities::{DeviceAddress, UnitId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollBotError {
    #[error("Ledger query failed: {0}")]
    Ledger(String),

    #[error("Poll disappeared from the ledger: {unit}")]
    PollVanished { unit: UnitId },

    #[error("Delivery to device {device} failed: {reason}")]
    Delivery {
        device: DeviceAddress,
        reason: String,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<rusqlite::Error> for PollBotError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Ledger(err.to_string())
    }
}

impl From<serde_json::Error> for PollBotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl PollBotError {
    /// Short label used as a metric dimension.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ledger(_) => "ledger",
            Self::PollVanished { .. } => "poll_vanished",
            Self::Delivery { .. } => "delivery",
            Self::Encoding(_) => "encoding",
        }
    }
}
