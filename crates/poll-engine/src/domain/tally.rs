//! Tally engine.
//!
//! Both weighting policies share one pipeline:
//!
//! 1. take vote rows in ledger order
//! 2. keep the last vote per key (address, or attested user)
//! 3. group keys by their effective choice
//! 4. weight each group
//! 5. emit every defined choice, zero-filled when nobody chose it
//!
//! Effective votes for choices the poll does not define are dropped.

use crate::domain::entities::{
    AttestationPolicy, AttestedChoiceResult, AttestedTally, AttestedVoteRow, BalanceChoiceResult,
    BalanceTally, VoteRow, VoteSequence,
};
use shared_types::entities::Address;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Reduce `(key, choice, sequence)` rows to the last choice per key.
///
/// Rows are ordered by sequence first (stable), so the result does not
/// depend on the order the gateway returned them in.
pub fn effective_votes<K, I>(rows: I) -> BTreeMap<K, String>
where
    K: Ord,
    I: IntoIterator<Item = (K, String, VoteSequence)>,
{
    let mut rows: Vec<_> = rows.into_iter().collect();
    rows.sort_by_key(|(_, _, sequence)| *sequence);

    let mut effective = BTreeMap::new();
    for (key, choice, _) in rows {
        effective.insert(key, choice);
    }
    effective
}

/// Group keys by effective choice following the poll's choice order.
///
/// Every defined choice appears exactly once, possibly with no keys.
pub fn group_by_choice<K>(effective: BTreeMap<K, String>, choices: &[String]) -> Vec<(String, Vec<K>)> {
    let mut groups: Vec<(String, Vec<K>)> = Vec::with_capacity(choices.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(choices.len());
    for choice in choices {
        if !index.contains_key(choice.as_str()) {
            index.insert(choice.as_str(), groups.len());
            groups.push((choice.clone(), Vec::new()));
        }
    }

    for (key, choice) in effective {
        if let Some(&slot) = index.get(choice.as_str()) {
            groups[slot].1.push(key);
        }
    }
    groups
}

/// Distinct addresses appearing in `rows`: the set whose balances a
/// balance tally needs.
#[must_use]
pub fn voting_addresses(rows: &[VoteRow]) -> Vec<Address> {
    rows.iter()
        .map(|row| row.address.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Balance-weighted tally. Addresses missing from `balances` weigh zero.
#[must_use]
pub fn tally_by_balance(
    choices: &[String],
    rows: &[VoteRow],
    balances: &HashMap<Address, u64>,
) -> BalanceTally {
    let effective = effective_votes(
        rows.iter()
            .map(|row| (row.address.clone(), row.choice.clone(), row.sequence)),
    );

    let choices = group_by_choice(effective, choices)
        .into_iter()
        .map(|(choice, addresses)| {
            let total_amount = addresses
                .iter()
                .filter_map(|address| balances.get(address))
                .fold(0u64, |total, amount| total.saturating_add(*amount));
            BalanceChoiceResult {
                choice,
                total_amount,
                addresses,
            }
        })
        .collect();

    BalanceTally { choices }
}

/// The identity each address votes as: the smallest user id attested on it.
///
/// An address attested by several trusted attestors appears once per
/// attestation in the gateway rows; it must still count as one user.
fn identity_by_address(rows: &[AttestedVoteRow]) -> HashMap<&Address, &str> {
    let mut identities: HashMap<&Address, &str> = HashMap::new();
    for row in rows {
        identities
            .entry(&row.address)
            .and_modify(|id| {
                if row.user_id.as_str() < *id {
                    *id = row.user_id.as_str();
                }
            })
            .or_insert(row.user_id.as_str());
    }
    identities
}

/// Attestation-weighted tally: one vote per attested user.
///
/// A user attested on several addresses counts once, under the latest vote
/// cast from any of them. An address never counts as more than one user.
#[must_use]
pub fn tally_by_attestation(
    policy: AttestationPolicy,
    choices: &[String],
    rows: &[AttestedVoteRow],
) -> AttestedTally {
    let identities = identity_by_address(rows);
    let effective = effective_votes(rows.iter().filter_map(|row| {
        identities
            .get(&row.address)
            .map(|user| ((*user).to_string(), row.choice.clone(), row.sequence))
    }));

    let choices: Vec<AttestedChoiceResult> = group_by_choice(effective, choices)
        .into_iter()
        .map(|(choice, users)| AttestedChoiceResult {
            choice,
            users: users.len(),
        })
        .collect();
    let total_users = choices.iter().map(|c| c.users).sum();

    AttestedTally {
        policy,
        choices,
        total_users,
    }
}

/// `round(count / total * 1000)`, i.e. the percentage in tenths, rounding
/// halves up. `None` when `total` is zero.
#[must_use]
pub fn percentage_tenths(count: usize, total: usize) -> Option<u64> {
    if total == 0 {
        return None;
    }
    let count = count as u128;
    let total = total as u128;
    let tenths = (count * 2000 + total) / (2 * total);
    u64::try_from(tenths).ok()
}
