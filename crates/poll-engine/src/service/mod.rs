//! Service Layer
//!
//! Application service that drives the domain through the ports.

pub mod poll_bot_service;

pub use poll_bot_service::{
    PollBotService, PollBotSettings, DEFAULT_VOTE_VISIBILITY_POLL, DEFAULT_VOTE_VISIBILITY_TIMEOUT,
};
