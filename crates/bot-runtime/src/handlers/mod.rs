//! # Event Handlers
//!
//! Background tasks that consume the chat bus.

pub mod dispatcher;

pub use dispatcher::ChatDispatcher;
