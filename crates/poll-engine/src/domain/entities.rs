//! Poll engine domain entities.
//!
//! Row types mirror what the ledger gateway returns; tally types are what
//! the tally engine hands to the reply formatter.

use serde::{Deserialize, Serialize};
use shared_types::entities::{Address, UnitId};

/// Smallest native-token units per displayed `GB`.
pub const UNITS_PER_GBYTE: u64 = 1_000_000_000;

/// Sequence position of a vote in the ledger (row order).
pub type VoteSequence = u64;

/// A whitelisted poll as listed to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    /// Unit that defined the poll.
    pub unit: UnitId,
    /// Question text.
    pub question: String,
}

/// One recorded vote, attributed to an author address of the voting unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRow {
    pub address: Address,
    pub choice: String,
    pub sequence: VoteSequence,
}

/// A vote row whose author holds a `user_id` attestation from a trusted
/// attestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedVoteRow {
    pub address: Address,
    pub user_id: String,
    pub choice: String,
    pub sequence: VoteSequence,
}

/// Which attestor set backs an attestation-weighted tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationPolicy {
    /// Real-name attestations (the default for the `attested` command).
    RealName,
    /// Steem account attestations.
    Steem,
    /// Email attestations.
    Email,
}

impl AttestationPolicy {
    /// Every policy, in the order results link to them.
    pub const ALL: [AttestationPolicy; 3] = [Self::RealName, Self::Steem, Self::Email];

    /// Chat command word selecting this policy.
    #[must_use]
    pub fn command_word(self) -> &'static str {
        match self {
            Self::RealName => "attested",
            Self::Steem => "steem",
            Self::Email => "email",
        }
    }

    /// Human-readable description of who is counted.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::RealName => "real-name attested users",
            Self::Steem => "Steem-attested users",
            Self::Email => "email-attested users",
        }
    }

    /// Metric label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RealName => "real_name",
            Self::Steem => "steem",
            Self::Email => "email",
        }
    }
}

/// Trusted attestor addresses per policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestorSets {
    pub real_name: Vec<Address>,
    pub steem: Vec<Address>,
    pub email: Vec<Address>,
}

impl AttestorSets {
    /// Attestors trusted under `policy`.
    #[must_use]
    pub fn for_policy(&self, policy: AttestationPolicy) -> &[Address] {
        match policy {
            AttestationPolicy::RealName => &self.real_name,
            AttestationPolicy::Steem => &self.steem,
            AttestationPolicy::Email => &self.email,
        }
    }
}

/// Balance-weighted result for one choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChoiceResult {
    pub choice: String,
    /// Sum of unspent native outputs of `addresses`, in smallest units.
    pub total_amount: u64,
    /// Addresses whose effective vote is this choice.
    pub addresses: Vec<Address>,
}

/// Balance-weighted tally over all defined choices of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BalanceTally {
    pub choices: Vec<BalanceChoiceResult>,
}

impl BalanceTally {
    /// Result for `choice`, if the poll defines it.
    #[must_use]
    pub fn get(&self, choice: &str) -> Option<&BalanceChoiceResult> {
        self.choices.iter().find(|c| c.choice == choice)
    }

    /// Number of distinct voting addresses across all choices.
    #[must_use]
    pub fn voter_count(&self) -> usize {
        self.choices.iter().map(|c| c.addresses.len()).sum()
    }
}

/// Attestation-weighted result for one choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedChoiceResult {
    pub choice: String,
    /// Distinct attested users whose effective vote is this choice.
    pub users: usize,
}

/// Attestation-weighted tally over all defined choices of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedTally {
    pub policy: AttestationPolicy,
    pub choices: Vec<AttestedChoiceResult>,
    /// Distinct attested users with an effective vote on the poll.
    pub total_users: usize,
}

impl AttestedTally {
    /// Result for `choice`, if the poll defines it.
    #[must_use]
    pub fn get(&self, choice: &str) -> Option<&AttestedChoiceResult> {
        self.choices.iter().find(|c| c.choice == choice)
    }
}

/// Payload of a `vote:` link, interpreted by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteLinkPayload {
    pub poll_unit: UnitId,
    pub choice: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attestor_sets_for_policy() {
        let sets = AttestorSets {
            real_name: vec![Address::from("REAL")],
            steem: vec![Address::from("STEEM")],
            email: vec![],
        };

        assert_eq!(sets.for_policy(AttestationPolicy::RealName)[0].as_str(), "REAL");
        assert_eq!(sets.for_policy(AttestationPolicy::Steem)[0].as_str(), "STEEM");
        assert!(sets.for_policy(AttestationPolicy::Email).is_empty());
    }

    #[test]
    fn test_vote_payload_field_order() {
        let payload = VoteLinkPayload {
            poll_unit: UnitId::from("U"),
            choice: "Yes".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"poll_unit":"U","choice":"Yes"}"#);
    }

    #[test]
    fn test_policy_command_words_are_distinct() {
        let words: std::collections::HashSet<_> = AttestationPolicy::ALL
            .iter()
            .map(|p| p.command_word())
            .collect();
        assert_eq!(words.len(), 3);
    }
}
