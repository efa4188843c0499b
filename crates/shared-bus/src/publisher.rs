//! Publishing side of the chat bus.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::events::{ChatEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Anything chat events can be published to.
///
/// The wallet bridge publishes inbound events, the poll engine its replies.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event`. Returns the number of live subscriptions it reached,
    /// before their filters are applied.
    async fn publish(&self, event: ChatEvent) -> usize;
}

/// Broadcast bus shared by every component of the bot.
///
/// Each subscription buffers up to `capacity` events; a subscription that
/// falls further behind loses the oldest ones.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ChatEvent>,
    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Start receiving events that match `filter`. Only events published
    /// after this call are seen.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, devices = filter.devices.len(), "Chat subscription opened");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: ChatEvent) -> usize {
        let topic = event.topic();
        let device = event.device().clone();
        // send only fails when nobody is subscribed
        let reached = self.sender.send(event).unwrap_or(0);
        debug!(topic = ?topic, device = %device, reached, "Chat event published");
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use shared_types::entities::DeviceAddress;

    fn inbound(text: &str) -> ChatEvent {
        ChatEvent::text_received(DeviceAddress::from("0DEVICE"), text)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_reaches_nobody() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.publish(inbound("polls")).await, 0);
    }

    #[tokio::test]
    async fn test_publish_counts_subscriptions_before_filtering() {
        let bus = InMemoryEventBus::new();
        let _inbound = bus.subscribe(EventFilter::topics(vec![EventTopic::Inbound]));
        let _outbound = bus.subscribe(EventFilter::topics(vec![EventTopic::Outbound]));

        assert_eq!(bus.publish(inbound("stats")).await, 2);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_not_counted() {
        let bus = InMemoryEventBus::new();
        {
            let _sub = bus.subscribe(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(inbound("polls")).await, 0);
    }

    #[test]
    fn test_capacity() {
        assert_eq!(InMemoryEventBus::default().capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(InMemoryEventBus::with_capacity(16).capacity(), 16);
        assert_eq!(InMemoryEventBus::with_capacity(0).capacity(), 1);
    }
}
