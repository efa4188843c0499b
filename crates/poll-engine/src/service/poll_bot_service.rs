//! Poll Bot Service
//!
//! Orchestrates parsing, ledger lookups, tallies, replies and sessions for
//! one inbound message at a time. Callers must not run two messages of the
//! same device concurrently; the runtime's per-device workers ensure that.

use async_trait::async_trait;
use shared_types::entities::{DeviceAddress, UnitId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::command::{Command, CommandParser, Target, DEFAULT_MAX_TEXT_CHARS};
use crate::domain::entities::{AttestationPolicy, AttestorSets, PollSummary, VoteSequence};
use crate::domain::errors::PollBotError;
use crate::domain::format;
use crate::domain::session::SessionStore;
use crate::domain::tally;
use crate::ports::{LedgerGateway, MessagingGateway, Outcome, PollBotApi, ReplyKind};

/// Default bound on waiting for a fresh vote after `voted:`.
pub const DEFAULT_VOTE_VISIBILITY_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Default interval between ledger checks while waiting for a vote.
pub const DEFAULT_VOTE_VISIBILITY_POLL: Duration = Duration::from_millis(200);

/// Runtime settings of the service.
#[derive(Debug, Clone)]
pub struct PollBotSettings {
    /// Poll units the bot serves.
    pub whitelist: Vec<UnitId>,
    /// Trusted attestors per policy.
    pub attestors: AttestorSets,
    pub max_text_chars: usize,
    pub vote_visibility_timeout: Duration,
    pub vote_visibility_poll: Duration,
}

impl Default for PollBotSettings {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            attestors: AttestorSets::default(),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            vote_visibility_timeout: DEFAULT_VOTE_VISIBILITY_TIMEOUT,
            vote_visibility_poll: DEFAULT_VOTE_VISIBILITY_POLL,
        }
    }
}

/// A poll a command resolved to.
#[derive(Debug, Clone)]
struct ResolvedPoll {
    unit: UnitId,
    question: String,
    /// Watermark stored in the session, when resolved from it.
    watermark: Option<VoteSequence>,
}

/// Poll bot service implementation
///
/// Implements the `PollBotApi` port using injected dependencies.
pub struct PollBotService<L: LedgerGateway, M: MessagingGateway> {
    ledger: Arc<L>,
    messenger: Arc<M>,
    sessions: Arc<SessionStore>,
    parser: CommandParser,
    settings: PollBotSettings,
}

impl<L: LedgerGateway, M: MessagingGateway> PollBotService<L, M> {
    pub fn new(
        ledger: Arc<L>,
        messenger: Arc<M>,
        sessions: Arc<SessionStore>,
        settings: PollBotSettings,
    ) -> Self {
        Self {
            ledger,
            messenger,
            sessions,
            parser: CommandParser::new(settings.max_text_chars),
            settings,
        }
    }

    /// Session store shared with the cleanup task.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    async fn reply(
        &self,
        device: &DeviceAddress,
        body: String,
        kind: ReplyKind,
    ) -> Result<Outcome, PollBotError> {
        self.messenger.send_text(device, body).await?;
        debug!(device = %device, reply = kind.as_str(), "Reply sent");
        Ok(Outcome::Replied { kind })
    }

    async fn send_poll_list(&self, device: &DeviceAddress) -> Result<Outcome, PollBotError> {
        self.sessions.clear(device);
        let polls = self.ledger.whitelisted_polls(&self.settings.whitelist).await?;
        self.reply(device, format::poll_list(&polls), ReplyKind::PollList)
            .await
    }

    /// Store `unit` as the device's selection, with the current watermark.
    async fn remember(&self, device: &DeviceAddress, unit: &UnitId) -> Result<(), PollBotError> {
        let watermark = self.ledger.latest_vote_sequence(unit).await?;
        self.sessions.select(device, unit.clone(), watermark);
        Ok(())
    }

    async fn resolve(
        &self,
        device: &DeviceAddress,
        target: &Target,
    ) -> Result<Option<ResolvedPoll>, PollBotError> {
        match target {
            Target::Explicit(unit) => {
                if !self.settings.whitelist.contains(unit) {
                    debug!(device = %device, poll_unit = %unit, "Unit is not whitelisted");
                    return Ok(None);
                }
                Ok(self
                    .ledger
                    .question(unit)
                    .await?
                    .map(|question| ResolvedPoll {
                        unit: unit.clone(),
                        question,
                        watermark: None,
                    }))
            }
            Target::Selected => {
                let Some(entry) = self.sessions.selected(device) else {
                    return Ok(None);
                };
                let question = self.ledger.question(&entry.poll_unit).await?.ok_or_else(|| {
                    PollBotError::PollVanished {
                        unit: entry.poll_unit.clone(),
                    }
                })?;
                Ok(Some(ResolvedPoll {
                    unit: entry.poll_unit,
                    question,
                    watermark: entry.vote_watermark,
                }))
            }
        }
    }

    async fn show_poll(
        &self,
        device: &DeviceAddress,
        unit: &UnitId,
        question: &str,
    ) -> Result<Outcome, PollBotError> {
        self.remember(device, unit).await?;
        let choices = self.ledger.choices(unit).await?;
        if choices.is_empty() {
            warn!(poll_unit = %unit, "Poll has no choices");
            return self
                .reply(device, format::malformed_poll(unit), ReplyKind::MalformedPoll)
                .await;
        }
        let body = format::choice_menu(unit, question, &choices)?;
        self.reply(device, body, ReplyKind::ChoiceMenu).await
    }

    async fn show_balance_results(
        &self,
        device: &DeviceAddress,
        poll: &ResolvedPoll,
        stale: bool,
    ) -> Result<Outcome, PollBotError> {
        let rows = self.ledger.vote_rows(&poll.unit).await?;
        let addresses = tally::voting_addresses(&rows);
        let balances = self.ledger.native_balances(&addresses).await?;
        let choices = self.ledger.choices(&poll.unit).await?;
        let result = tally::tally_by_balance(&choices, &rows, &balances);

        self.remember(device, &poll.unit).await?;
        let body = format::balance_results(&poll.unit, &poll.question, &result, stale);
        self.reply(device, body, ReplyKind::BalanceResults { stale })
            .await
    }

    async fn show_attested_results(
        &self,
        device: &DeviceAddress,
        poll: &ResolvedPoll,
        policy: AttestationPolicy,
    ) -> Result<Outcome, PollBotError> {
        let attestors = self.settings.attestors.for_policy(policy);
        let rows = self.ledger.attested_vote_rows(&poll.unit, attestors).await?;
        let choices = self.ledger.choices(&poll.unit).await?;
        let result = tally::tally_by_attestation(policy, &choices, &rows);

        self.remember(device, &poll.unit).await?;
        let body = format::attested_results(&poll.unit, &poll.question, &result);
        self.reply(device, body, ReplyKind::AttestedResults { policy })
            .await
    }

    /// Poll the ledger until a vote newer than `watermark` shows up.
    ///
    /// Returns `false` when the timeout elapsed first.
    async fn wait_for_new_vote(
        &self,
        unit: &UnitId,
        watermark: Option<VoteSequence>,
    ) -> Result<bool, PollBotError> {
        let deadline = tokio::time::Instant::now() + self.settings.vote_visibility_timeout;
        loop {
            let latest = self.ledger.latest_vote_sequence(unit).await?;
            if latest > watermark {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let pause = self.settings.vote_visibility_poll.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }

    async fn search(&self, device: &DeviceAddress, text: &str) -> Result<Outcome, PollBotError> {
        let polls = self.ledger.whitelisted_polls(&self.settings.whitelist).await?;

        if let Some(poll) = polls.iter().find(|poll| poll.question == text) {
            return self.show_poll(device, &poll.unit, &poll.question).await;
        }

        let candidates: Vec<PollSummary> = polls
            .into_iter()
            .filter(|poll| poll.question.starts_with(text))
            .collect();
        match candidates.as_slice() {
            [] => self.send_poll_list(device).await,
            [poll] => self.show_poll(device, &poll.unit, &poll.question).await,
            _ => {
                debug!(device = %device, matches = candidates.len(), "Ambiguous question prefix");
                self.reply(
                    device,
                    format::ambiguous_match(text, &candidates),
                    ReplyKind::Ambiguous,
                )
                .await
            }
        }
    }
}

#[async_trait]
impl<L, M> PollBotApi for PollBotService<L, M>
where
    L: LedgerGateway + 'static,
    M: MessagingGateway + 'static,
{
    async fn handle_text(
        &self,
        device: &DeviceAddress,
        text: &str,
    ) -> Result<Outcome, PollBotError> {
        let Some(command) = self.parser.classify(text) else {
            info!(device = %device, chars = text.chars().count(), "Oversized message ignored");
            return Ok(Outcome::Ignored);
        };
        debug!(device = %device, command = command.name(), "Handling command");

        match command {
            Command::ListPolls => self.send_poll_list(device).await,
            Command::ShowPoll(target) => match self.resolve(device, &target).await? {
                Some(poll) => self.show_poll(device, &poll.unit, &poll.question).await,
                None => self.send_poll_list(device).await,
            },
            Command::BalanceResults(target) => match self.resolve(device, &target).await? {
                Some(poll) => self.show_balance_results(device, &poll, false).await,
                None => self.send_poll_list(device).await,
            },
            Command::AttestedResults { policy, target } => {
                match self.resolve(device, &target).await? {
                    Some(poll) => self.show_attested_results(device, &poll, policy).await,
                    None => self.send_poll_list(device).await,
                }
            }
            Command::VoteAcknowledged => match self.resolve(device, &Target::Selected).await? {
                Some(poll) => {
                    let visible = self.wait_for_new_vote(&poll.unit, poll.watermark).await?;
                    if !visible {
                        warn!(device = %device, poll_unit = %poll.unit, "Vote not visible yet, results may be stale");
                    }
                    self.show_balance_results(device, &poll, !visible).await
                }
                None => self.send_poll_list(device).await,
            },
            Command::SearchByQuestion(text) => self.search(device, &text).await,
        }
    }

    async fn handle_paired(&self, device: &DeviceAddress) -> Result<Outcome, PollBotError> {
        info!(device = %device, "Device paired");
        self.send_poll_list(device).await
    }
}
