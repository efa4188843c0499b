//! Chat command grammar.
//!
//! | Text | Command |
//! |------|---------|
//! | `*`, `0000`, `polls`, empty | [`Command::ListPolls`] |
//! | `poll[-UNIT]` | [`Command::ShowPoll`] |
//! | `stats[-UNIT]` | [`Command::BalanceResults`] |
//! | `attested[-UNIT]`, `steem[-UNIT]`, `email[-UNIT]` | [`Command::AttestedResults`] |
//! | `voted:…` | [`Command::VoteAcknowledged`] |
//! | anything else | [`Command::SearchByQuestion`] |
//!
//! Command words are case-insensitive. Texts longer than the configured limit
//! are not classified at all.

use crate::domain::entities::AttestationPolicy;
use regex::Regex;
use shared_types::entities::UnitId;
use std::sync::LazyLock;

/// Default abuse guard on inbound text length, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;

static COMMAND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^(?:(?P<word>poll|stats|attested|email|steem)(?:-(?P<unit>\S+))?|(?P<voted>voted:).*)$",
    )
    .expect("invalid command pattern")
});

/// Which poll a command refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Unit given in the command suffix.
    Explicit(UnitId),
    /// Whatever poll the device has selected.
    Selected,
}

/// A classified chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListPolls,
    ShowPoll(Target),
    BalanceResults(Target),
    AttestedResults {
        policy: AttestationPolicy,
        target: Target,
    },
    /// The wallet reports that the user just voted on the selected poll.
    VoteAcknowledged,
    /// Free text matched against whitelisted poll questions.
    SearchByQuestion(String),
}

impl Command {
    /// Stable name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListPolls => "list_polls",
            Self::ShowPoll(_) => "show_poll",
            Self::BalanceResults(_) => "stats",
            Self::AttestedResults { .. } => "attested_stats",
            Self::VoteAcknowledged => "voted",
            Self::SearchByQuestion(_) => "search",
        }
    }
}

/// Classifies inbound text into a [`Command`].
#[derive(Debug, Clone)]
pub struct CommandParser {
    max_text_chars: usize,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TEXT_CHARS)
    }
}

impl CommandParser {
    #[must_use]
    pub fn new(max_text_chars: usize) -> Self {
        Self { max_text_chars }
    }

    /// Classify `text`. Returns `None` when the text must be ignored.
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<Command> {
        // byte length bounds char count from above
        if text.len() > self.max_text_chars && text.chars().count() > self.max_text_chars {
            return None;
        }

        let text = text.trim();
        if matches!(text, "" | "*" | "0000" | "polls") {
            return Some(Command::ListPolls);
        }

        let Some(captures) = COMMAND_PATTERN.captures(text) else {
            return Some(Command::SearchByQuestion(text.to_string()));
        };

        if captures.name("voted").is_some() {
            return Some(Command::VoteAcknowledged);
        }

        let target = captures
            .name("unit")
            .map_or(Target::Selected, |unit| {
                Target::Explicit(UnitId::new(unit.as_str()))
            });
        let word = captures
            .name("word")
            .map(|w| w.as_str().to_ascii_lowercase())
            .unwrap_or_default();

        let command = match word.as_str() {
            "poll" => Command::ShowPoll(target),
            "stats" => Command::BalanceResults(target),
            "steem" => Command::AttestedResults {
                policy: AttestationPolicy::Steem,
                target,
            },
            "email" => Command::AttestedResults {
                policy: AttestationPolicy::Email,
                target,
            },
            _ => Command::AttestedResults {
                policy: AttestationPolicy::RealName,
                target,
            },
        };
        Some(command)
    }
}
