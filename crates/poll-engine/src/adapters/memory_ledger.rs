//! In-memory ledger gateway.
//!
//! Holds polls, votes, outputs and attestations in process memory. Used by
//! tests and local demos; every mutation takes `&self` so a shared ledger can
//! change while the bot is running.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::entities::{Address, UnitId};
use std::collections::HashMap;

use crate::domain::entities::{AttestedVoteRow, PollSummary, VoteRow, VoteSequence};
use crate::domain::errors::PollBotError;
use crate::ports::outbound::LedgerGateway;

#[derive(Debug, Clone)]
struct StoredPoll {
    unit: UnitId,
    question: String,
    choices: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredVote {
    sequence: VoteSequence,
    poll_unit: UnitId,
    authors: Vec<Address>,
    choice: String,
}

#[derive(Debug, Clone)]
struct StoredOutput {
    address: Address,
    amount: u64,
    /// `None` for the native token.
    asset: Option<String>,
    spent: bool,
}

#[derive(Debug, Clone)]
struct StoredAttestation {
    address: Address,
    attestor: Address,
    user_id: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    polls: Vec<StoredPoll>,
    votes: Vec<StoredVote>,
    outputs: Vec<StoredOutput>,
    attestations: Vec<StoredAttestation>,
    next_sequence: VoteSequence,
}

/// Ledger gateway backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a poll. Later polls are listed first.
    pub fn add_poll(&self, unit: impl Into<UnitId>, question: &str, choices: &[&str]) {
        self.state.write().polls.push(StoredPoll {
            unit: unit.into(),
            question: question.to_string(),
            choices: choices.iter().map(|c| (*c).to_string()).collect(),
        });
    }

    /// Drop a poll definition, leaving its votes in place.
    pub fn remove_poll(&self, unit: &UnitId) {
        self.state.write().polls.retain(|poll| &poll.unit != unit);
    }

    /// Record a single-author vote. Returns its sequence.
    pub fn record_vote(
        &self,
        poll_unit: impl Into<UnitId>,
        author: impl Into<Address>,
        choice: &str,
    ) -> VoteSequence {
        self.record_joint_vote(poll_unit, vec![author.into()], choice)
    }

    /// Record a vote unit signed by several authors. Returns its sequence.
    pub fn record_joint_vote(
        &self,
        poll_unit: impl Into<UnitId>,
        authors: Vec<Address>,
        choice: &str,
    ) -> VoteSequence {
        let mut state = self.state.write();
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.votes.push(StoredVote {
            sequence,
            poll_unit: poll_unit.into(),
            authors,
            choice: choice.to_string(),
        });
        sequence
    }

    /// Add an unspent native-token output.
    pub fn add_output(&self, address: impl Into<Address>, amount: u64) {
        self.state.write().outputs.push(StoredOutput {
            address: address.into(),
            amount,
            asset: None,
            spent: false,
        });
    }

    /// Add an unspent output of a custom asset. Never counted as balance.
    pub fn add_asset_output(&self, address: impl Into<Address>, asset: &str, amount: u64) {
        self.state.write().outputs.push(StoredOutput {
            address: address.into(),
            amount,
            asset: Some(asset.to_string()),
            spent: false,
        });
    }

    /// Mark every output of `address` as spent.
    pub fn spend_all(&self, address: &Address) {
        let mut state = self.state.write();
        for output in state.outputs.iter_mut().filter(|o| &o.address == address) {
            output.spent = true;
        }
    }

    /// Attest `address` with `user_id` by `attestor`.
    pub fn attest(
        &self,
        address: impl Into<Address>,
        attestor: impl Into<Address>,
        user_id: &str,
    ) {
        self.state.write().attestations.push(StoredAttestation {
            address: address.into(),
            attestor: attestor.into(),
            user_id: user_id.to_string(),
        });
    }

    fn votes_on<'a>(
        state: &'a LedgerState,
        poll_unit: &'a UnitId,
    ) -> impl Iterator<Item = &'a StoredVote> + 'a {
        state.votes.iter().filter(move |v| &v.poll_unit == poll_unit)
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn whitelisted_polls(&self, units: &[UnitId]) -> Result<Vec<PollSummary>, PollBotError> {
        let state = self.state.read();
        Ok(state
            .polls
            .iter()
            .rev()
            .filter(|poll| units.contains(&poll.unit))
            .map(|poll| PollSummary {
                unit: poll.unit.clone(),
                question: poll.question.clone(),
            })
            .collect())
    }

    async fn question(&self, unit: &UnitId) -> Result<Option<String>, PollBotError> {
        let state = self.state.read();
        Ok(state
            .polls
            .iter()
            .find(|poll| &poll.unit == unit)
            .map(|poll| poll.question.clone()))
    }

    async fn choices(&self, unit: &UnitId) -> Result<Vec<String>, PollBotError> {
        let state = self.state.read();
        Ok(state
            .polls
            .iter()
            .find(|poll| &poll.unit == unit)
            .map(|poll| poll.choices.clone())
            .unwrap_or_default())
    }

    async fn vote_rows(&self, poll_unit: &UnitId) -> Result<Vec<VoteRow>, PollBotError> {
        let state = self.state.read();
        Ok(Self::votes_on(&state, poll_unit)
            .flat_map(|vote| {
                vote.authors.iter().map(move |author| VoteRow {
                    address: author.clone(),
                    choice: vote.choice.clone(),
                    sequence: vote.sequence,
                })
            })
            .collect())
    }

    async fn native_balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, u64>, PollBotError> {
        let state = self.state.read();
        let mut balances = HashMap::new();
        for output in &state.outputs {
            if output.spent || output.asset.is_some() || !addresses.contains(&output.address) {
                continue;
            }
            let balance = balances.entry(output.address.clone()).or_insert(0u64);
            *balance = balance.saturating_add(output.amount);
        }
        Ok(balances)
    }

    async fn attested_vote_rows(
        &self,
        poll_unit: &UnitId,
        attestors: &[Address],
    ) -> Result<Vec<AttestedVoteRow>, PollBotError> {
        let state = self.state.read();
        let mut rows = Vec::new();
        for vote in Self::votes_on(&state, poll_unit) {
            for author in &vote.authors {
                for attestation in state
                    .attestations
                    .iter()
                    .filter(|a| &a.address == author && attestors.contains(&a.attestor))
                {
                    rows.push(AttestedVoteRow {
                        address: author.clone(),
                        user_id: attestation.user_id.clone(),
                        choice: vote.choice.clone(),
                        sequence: vote.sequence,
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn latest_vote_sequence(
        &self,
        poll_unit: &UnitId,
    ) -> Result<Option<VoteSequence>, PollBotError> {
        let state = self.state.read();
        Ok(Self::votes_on(&state, poll_unit).map(|v| v.sequence).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_whitelisted_polls_newest_first() {
        let ledger = InMemoryLedger::new();
        ledger.add_poll("U1", "First?", &["a"]);
        ledger.add_poll("U2", "Second?", &["b"]);
        ledger.add_poll("U3", "Hidden?", &["c"]);

        let polls = ledger
            .whitelisted_polls(&[UnitId::from("U1"), UnitId::from("U2")])
            .await
            .unwrap();
        let units: Vec<_> = polls.iter().map(|p| p.unit.as_str()).collect();
        assert_eq!(units, ["U2", "U1"]);
    }

    #[tokio::test]
    async fn test_balances_skip_spent_and_assets() {
        let ledger = InMemoryLedger::new();
        ledger.add_output("A", 100);
        ledger.add_output("A", 50);
        ledger.add_asset_output("A", "TOKEN", 1_000);
        ledger.add_output("B", 70);
        ledger.spend_all(&Address::from("B"));

        let balances = ledger
            .native_balances(&[Address::from("A"), Address::from("B")])
            .await
            .unwrap();
        assert_eq!(balances.get(&Address::from("A")), Some(&150));
        assert_eq!(balances.get(&Address::from("B")), None);
    }

    #[tokio::test]
    async fn test_joint_vote_yields_row_per_author() {
        let ledger = InMemoryLedger::new();
        ledger.add_poll("U1", "Q?", &["Yes"]);
        let seq = ledger.record_joint_vote(
            "U1",
            vec![Address::from("A"), Address::from("B")],
            "Yes",
        );

        let rows = ledger.vote_rows(&UnitId::from("U1")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.sequence == seq));
        assert_eq!(
            ledger.latest_vote_sequence(&UnitId::from("U1")).await.unwrap(),
            Some(seq)
        );
    }

    #[tokio::test]
    async fn test_attested_rows_filter_by_attestor() {
        let ledger = InMemoryLedger::new();
        ledger.add_poll("U1", "Q?", &["Yes"]);
        ledger.record_vote("U1", "A", "Yes");
        ledger.record_vote("U1", "B", "Yes");
        ledger.attest("A", "TRUSTED", "user-a");
        ledger.attest("B", "OTHER", "user-b");

        let rows = ledger
            .attested_vote_rows(&UnitId::from("U1"), &[Address::from("TRUSTED")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "user-a");
    }
}
