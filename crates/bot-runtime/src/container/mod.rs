//! # Bot Container
//!
//! Configuration and the wired service instances.

pub mod config;
pub mod services;

pub use config::{BotConfig, ConfigError};
pub use services::BotContainer;
