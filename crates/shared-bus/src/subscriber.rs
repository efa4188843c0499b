//! Receiving side of the chat bus.

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::warn;

use crate::events::{ChatEvent, EventFilter};

/// A filtered view of the bus. Dropping it unsubscribes.
pub struct Subscription {
    receiver: Receiver<ChatEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: Receiver<ChatEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once the bus is gone and the buffer is empty. Events
    /// lost to lag are logged and skipped.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => self.report_lag(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    ///
    /// Used to drain a subscription at shutdown.
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => self.report_lag(missed),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    fn report_lag(&self, missed: u64) {
        warn!(missed, topics = ?self.filter.topics, "Chat subscriber lagged, oldest events lost");
    }
}
