//! Domain layer: commands, tallies, replies and sessions.

pub mod command;
pub mod entities;
pub mod errors;
pub mod format;
pub mod session;
pub mod tally;

pub use command::{Command, CommandParser, Target, DEFAULT_MAX_TEXT_CHARS};
pub use entities::*;
pub use errors::PollBotError;
pub use session::{cleanup_task, SessionEntry, SessionStore};
