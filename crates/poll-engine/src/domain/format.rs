//! Reply formatter.
//!
//! Chat replies are markdown-like text understood by the wallet: a link
//! `[label](command:X)` sends `X` back to the bot when tapped, a link
//! `[label](vote:B)` asks the wallet to cast the vote encoded in `B`.

use crate::domain::command::{Command, CommandParser};
use crate::domain::entities::{
    AttestationPolicy, AttestedTally, BalanceTally, PollSummary, VoteLinkPayload, UNITS_PER_GBYTE,
};
use crate::domain::errors::PollBotError;
use crate::domain::tally::percentage_tenths;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use shared_types::entities::UnitId;

fn command_link(label: &str, command: &str) -> String {
    format!("[{label}](command:{command})")
}

fn polls_link() -> String {
    command_link("polls", "polls")
}

/// Command that selects `poll` when sent back by the wallet.
///
/// The question itself is the friendliest command. It is used only when it
/// parses back as a search for exactly that question and holds no `)`,
/// which would end the link early. Otherwise the poll is selected by unit.
#[must_use]
pub fn poll_command(poll: &PollSummary) -> String {
    let searches_itself = matches!(
        CommandParser::default().classify(&poll.question),
        Some(Command::SearchByQuestion(text)) if text == poll.question
    );
    if searches_itself && !poll.question.contains(')') {
        poll.question.clone()
    } else {
        format!("poll-{}", poll.unit)
    }
}

fn poll_bullets(polls: &[PollSummary]) -> String {
    polls
        .iter()
        .map(|poll| format!("- {}", command_link(&poll.question, &poll_command(poll))))
        .collect::<Vec<_>>()
        .join("\n")
}

/// List of whitelisted polls. An empty list still yields the heading.
#[must_use]
pub fn poll_list(polls: &[PollSummary]) -> String {
    format!(
        "Please select the poll you would like to vote on:\n\n{}",
        poll_bullets(polls)
    )
}

/// Base64 payload of a `vote:` link.
pub fn vote_payload(poll_unit: &UnitId, choice: &str) -> Result<String, PollBotError> {
    let payload = VoteLinkPayload {
        poll_unit: poll_unit.clone(),
        choice: choice.to_string(),
    };
    let json = serde_json::to_string(&payload)?;
    Ok(STANDARD.encode(json))
}

/// Choice menu with one vote link per choice.
pub fn choice_menu(
    poll_unit: &UnitId,
    question: &str,
    choices: &[String],
) -> Result<String, PollBotError> {
    let buttons = choices
        .iter()
        .map(|choice| Ok(format!("- [{choice}](vote:{})", vote_payload(poll_unit, choice)?)))
        .collect::<Result<Vec<_>, PollBotError>>()?;

    Ok(format!(
        "Choose your answer for:\n{question}\n\n{}\n\nSee the {} or other {}",
        buttons.join("\n"),
        command_link("stats", &format!("stats-{poll_unit}")),
        polls_link(),
    ))
}

/// Render an amount in smallest units as `GB`, exactly.
///
/// `1_500_000_000` → `1.5`, `0` → `0`, `1` → `0.000000001`.
#[must_use]
pub fn format_gbytes(amount: u64) -> String {
    let whole = amount / UNITS_PER_GBYTE;
    let fraction = amount % UNITS_PER_GBYTE;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:09}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// Balance-weighted results.
///
/// `stale` adds a note that the device's latest vote may be missing.
#[must_use]
pub fn balance_results(
    poll_unit: &UnitId,
    question: &str,
    tally: &BalanceTally,
    stale: bool,
) -> String {
    let lines = tally
        .choices
        .iter()
        .map(|result| {
            format!(
                "- {}: {} GB ({})",
                result.choice,
                format_gbytes(result.total_amount),
                plural(result.addresses.len(), "address", "addresses"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut body = format!("Stats for:\n{question}\n\n{lines}");
    if stale {
        body.push_str(&format!(
            "\n\nYour latest vote may not be counted yet, check the {} again in a moment.",
            command_link("stats", &format!("stats-{poll_unit}")),
        ));
    }
    body.push_str(&format!(
        "\n\nSee {} stats, the {} or other {}",
        command_link(
            "attested",
            &format!("{}-{poll_unit}", AttestationPolicy::RealName.command_word())
        ),
        command_link("choices", &format!("poll-{poll_unit}")),
        polls_link(),
    ));
    body
}

/// Attestation-weighted results with percentages of all attested voters.
#[must_use]
pub fn attested_results(poll_unit: &UnitId, question: &str, tally: &AttestedTally) -> String {
    let lines = tally
        .choices
        .iter()
        .map(|result| {
            let users = plural(result.users, "user", "users");
            match percentage_tenths(result.users, tally.total_users) {
                Some(tenths) => format!(
                    "- {}: {users} ({}.{}%)",
                    result.choice,
                    tenths / 10,
                    tenths % 10
                ),
                None => format!("- {}: {users}", result.choice),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let others = AttestationPolicy::ALL
        .iter()
        .filter(|policy| **policy != tally.policy)
        .map(|policy| {
            command_link(
                policy.label(),
                &format!("{}-{poll_unit}", policy.command_word()),
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Stats by {} for:\n{question}\n\n{lines}\n\nTotal: {}\n\nSee stats by {}, by {others}, the {} or other {}",
        tally.policy.label(),
        plural(tally.total_users, "user", "users"),
        command_link("balance", &format!("stats-{poll_unit}")),
        command_link("choices", &format!("poll-{poll_unit}")),
        polls_link(),
    )
}

/// Reply for a poll without choices.
#[must_use]
pub fn malformed_poll(poll_unit: &UnitId) -> String {
    format!("no choices in poll {poll_unit}")
}

/// Reply when free text matches several poll questions.
#[must_use]
pub fn ambiguous_match(text: &str, candidates: &[PollSummary]) -> String {
    format!(
        "Several polls start with \"{text}\", please pick one:\n\n{}\n\nOr see all {}",
        poll_bullets(candidates),
        polls_link(),
    )
}
