//! # Bot Configuration
//!
//! Read once at startup: TOML file (every section optional), then
//! environment overrides, then validation. Not reloadable.
//!
//! ```toml
//! device_name = "Poll Bot"
//!
//! [polls]
//! whitelist = ["pecgjVXpD+UaVA1Tf0WBtdleC4vtWh/EtaghX/u/vEU="]
//!
//! [attestors]
//! real_name = ["I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT"]
//! steem = []
//! email = []
//!
//! [ledger]
//! database_path = "./byteball.sqlite"
//! ```

use poll_engine::{AttestorSets, PollBotSettings};
use serde::{Deserialize, Serialize};
use shared_types::entities::{Address, UnitId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid identifier in {section}: {value:?}")]
    InvalidIdentifier {
        section: &'static str,
        value: String,
    },
}

/// Complete bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Name the bot pairs under.
    pub device_name: String,
    pub polls: PollsConfig,
    pub attestors: AttestorsConfig,
    pub ledger: LedgerConfig,
    pub limits: LimitsConfig,
    pub session: SessionConfig,
    pub sync: SyncConfig,
    pub bus: BusConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            device_name: "Poll Bot".to_string(),
            polls: PollsConfig::default(),
            attestors: AttestorsConfig::default(),
            ledger: LedgerConfig::default(),
            limits: LimitsConfig::default(),
            session: SessionConfig::default(),
            sync: SyncConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

/// Served polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollsConfig {
    /// Poll units the bot serves.
    pub whitelist: Vec<String>,
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            whitelist: vec!["pecgjVXpD+UaVA1Tf0WBtdleC4vtWh/EtaghX/u/vEU=".to_string()],
        }
    }
}

/// Trusted attestor addresses per attestation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestorsConfig {
    pub real_name: Vec<String>,
    pub steem: Vec<String>,
    pub email: Vec<String>,
}

impl Default for AttestorsConfig {
    fn default() -> Self {
        Self {
            real_name: vec![
                "I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT".to_string(),
                "OHVQ2R5B6TUR5U7WJNYLP3FIOSR7VCED".to_string(),
            ],
            steem: Vec::new(),
            email: Vec::new(),
        }
    }
}

/// Ledger database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./byteball.sqlite"),
        }
    }
}

/// Inbound abuse limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longer messages are dropped without a reply.
    pub max_text_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_chars: poll_engine::domain::DEFAULT_MAX_TEXT_CHARS,
        }
    }
}

/// Per-device session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            cleanup_interval_secs: 300,
        }
    }
}

/// Waiting for a fresh vote after `voted:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub vote_visibility_timeout_ms: u64,
    pub vote_visibility_poll_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vote_visibility_timeout_ms: 2_000,
            vote_visibility_poll_ms: 200,
        }
    }
}

/// Event bus and device workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub channel_capacity: usize,
    /// A device worker with nothing to do for this long exits.
    pub worker_idle_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
            worker_idle_secs: 600,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

fn check_identifiers(section: &'static str, values: &[String]) -> Result<(), ConfigError> {
    match values.iter().find(|v| v.trim().is_empty() || v.trim() != v.as_str()) {
        Some(value) => Err(ConfigError::InvalidIdentifier {
            section,
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

impl BotConfig {
    /// Load from `path` (defaults when `None`), apply overrides from `env`,
    /// then validate.
    ///
    /// `env` is `|name| std::env::var(name).ok()` in production.
    pub fn load<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `POLL_BOT_DB`, `POLL_BOT_WHITELIST` and `POLL_BOT_MAX_TEXT_CHARS`.
    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = env("POLL_BOT_DB") {
            self.ledger.database_path = PathBuf::from(path);
        }
        if let Some(list) = env("POLL_BOT_WHITELIST") {
            self.polls.whitelist = list
                .split(',')
                .map(str::trim)
                .filter(|unit| !unit.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = env("POLL_BOT_MAX_TEXT_CHARS") {
            self.limits.max_text_chars = parse_env("POLL_BOT_MAX_TEXT_CHARS", value)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_text_chars == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_text_chars cannot be 0".into(),
            ));
        }
        if self.bus.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "channel_capacity cannot be 0".into(),
            ));
        }

        if self.session.ttl_secs == 0 || self.session.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "session ttl and cleanup interval cannot be 0".into(),
            ));
        }
        if self.bus.worker_idle_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "worker_idle_secs cannot be 0".into(),
            ));
        }
        if self.sync.vote_visibility_timeout_ms == 0 || self.sync.vote_visibility_poll_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "vote visibility timeout and poll interval cannot be 0".into(),
            ));
        }
        if self.sync.vote_visibility_poll_ms > self.sync.vote_visibility_timeout_ms {
            return Err(ConfigError::InvalidTimeout(
                "vote_visibility_poll_ms cannot exceed vote_visibility_timeout_ms".into(),
            ));
        }

        check_identifiers("polls.whitelist", &self.polls.whitelist)?;
        check_identifiers("attestors.real_name", &self.attestors.real_name)?;
        check_identifiers("attestors.steem", &self.attestors.steem)?;
        check_identifiers("attestors.email", &self.attestors.email)?;
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session.cleanup_interval_secs)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_secs(self.bus.worker_idle_secs)
    }

    /// Settings handed to the poll service.
    pub fn poll_settings(&self) -> PollBotSettings {
        let addresses = |list: &[String]| list.iter().map(Address::new).collect::<Vec<_>>();
        PollBotSettings {
            whitelist: self.polls.whitelist.iter().map(UnitId::new).collect(),
            attestors: AttestorSets {
                real_name: addresses(&self.attestors.real_name),
                steem: addresses(&self.attestors.steem),
                email: addresses(&self.attestors.email),
            },
            max_text_chars: self.limits.max_text_chars,
            vote_visibility_timeout: Duration::from_millis(self.sync.vote_visibility_timeout_ms),
            vote_visibility_poll: Duration::from_millis(self.sync.vote_visibility_poll_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::load(None, no_env).unwrap();
        assert_eq!(config.device_name, "Poll Bot");
        assert_eq!(config.polls.whitelist.len(), 1);
        assert_eq!(config.attestors.real_name.len(), 2);
        assert!(config.attestors.steem.is_empty());
        assert_eq!(config.limits.max_text_chars, 10_000);
        assert_eq!(config.sync.vote_visibility_timeout_ms, 2_000);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            device_name = "Council Polls"

            [polls]
            whitelist = ["UNIT1", "UNIT2"]

            [sync]
            vote_visibility_timeout_ms = 5000
            "#
        )
        .unwrap();

        let config = BotConfig::load(Some(file.path()), no_env).unwrap();
        assert_eq!(config.device_name, "Council Polls");
        assert_eq!(config.polls.whitelist, vec!["UNIT1", "UNIT2"]);
        assert_eq!(config.sync.vote_visibility_timeout_ms, 5_000);
        assert_eq!(config.sync.vote_visibility_poll_ms, 200);
        assert_eq!(config.session.ttl_secs, 86_400);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = BotConfig::load(Some(Path::new("/nonexistent/poll-bot.toml")), no_env);
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[polls\nwhitelist = 3").unwrap();
        let result = BotConfig::load(Some(file.path()), no_env);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("POLL_BOT_DB", "/var/lib/bot/ledger.sqlite"),
            ("POLL_BOT_WHITELIST", " A , B ,,C"),
            ("POLL_BOT_MAX_TEXT_CHARS", "500"),
        ]);
        let config = BotConfig::load(None, env).unwrap();
        assert_eq!(
            config.ledger.database_path,
            PathBuf::from("/var/lib/bot/ledger.sqlite")
        );
        assert_eq!(config.polls.whitelist, vec!["A", "B", "C"]);
        assert_eq!(config.limits.max_text_chars, 500);
    }

    #[test]
    fn test_bad_env_number_is_rejected() {
        let env = env_of(&[("POLL_BOT_MAX_TEXT_CHARS", "lots")]);
        let result = BotConfig::load(None, env);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { var: "POLL_BOT_MAX_TEXT_CHARS", .. })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_and_inverted_values() {
        let mut config = BotConfig::default();
        config.limits.max_text_chars = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));

        let mut config = BotConfig::default();
        config.sync.vote_visibility_poll_ms = 3_000;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));

        let mut config = BotConfig::default();
        config.session.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_validation_rejects_blank_identifiers() {
        let mut config = BotConfig::default();
        config.attestors.email = vec!["  ".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIdentifier { section: "attestors.email", .. })
        ));
    }

    #[test]
    fn test_poll_settings_mapping() {
        let config = BotConfig::default();
        let settings = config.poll_settings();
        assert_eq!(settings.whitelist.len(), 1);
        assert_eq!(settings.attestors.real_name.len(), 2);
        assert_eq!(settings.vote_visibility_poll, Duration::from_millis(200));
    }
}
