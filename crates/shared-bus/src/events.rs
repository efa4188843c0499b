//! # Chat Events
//!
//! Defines all event types that flow through the shared bus. Inbound events
//! come from the wallet's messaging layer, outbound events are replies on
//! their way back to it.

use serde::{Deserialize, Serialize};
use shared_types::entities::DeviceAddress;
use uuid::Uuid;

/// All events that can be published to the chat bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatEvent {
    // =========================================================================
    // INBOUND (wallet → bot)
    // =========================================================================
    /// A device completed pairing with the bot.
    Paired {
        /// The newly paired device.
        device: DeviceAddress,
    },

    /// A chat message arrived from a paired device.
    TextReceived {
        /// Bus-assigned identifier, used to correlate log lines.
        message_id: Uuid,
        /// The sending device.
        device: DeviceAddress,
        /// Raw message text.
        text: String,
    },

    // =========================================================================
    // OUTBOUND (bot → wallet)
    // =========================================================================
    /// A reply to be delivered to a device.
    TextOutbound {
        /// The receiving device.
        device: DeviceAddress,
        /// Message body (markdown with `command:`/`vote:` links).
        body: String,
    },
}

impl ChatEvent {
    /// Build a `TextReceived` event with a fresh message id.
    #[must_use]
    pub fn text_received(device: DeviceAddress, text: impl Into<String>) -> Self {
        Self::TextReceived {
            message_id: Uuid::new_v4(),
            device,
            text: text.into(),
        }
    }

    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Paired { .. } | Self::TextReceived { .. } => EventTopic::Inbound,
            Self::TextOutbound { .. } => EventTopic::Outbound,
        }
    }

    /// Bus message id of inbound text, for log correlation.
    #[must_use]
    pub fn message_id(&self) -> Option<Uuid> {
        match self {
            Self::TextReceived { message_id, .. } => Some(*message_id),
            Self::Paired { .. } | Self::TextOutbound { .. } => None,
        }
    }

    /// The device this event concerns.
    #[must_use]
    pub fn device(&self) -> &DeviceAddress {
        match self {
            Self::Paired { device }
            | Self::TextReceived { device, .. }
            | Self::TextOutbound { device, .. } => device,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Pairing and incoming chat text.
    Inbound,
    /// Replies to deliver.
    Outbound,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Devices to include. Empty means all devices.
    pub devices: Vec<DeviceAddress>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            devices: Vec::new(),
        }
    }

    /// Create a filter for events concerning specific devices.
    #[must_use]
    pub fn for_devices(devices: Vec<DeviceAddress>) -> Self {
        Self {
            topics: Vec::new(),
            devices,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChatEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let device_match = self.devices.is_empty() || self.devices.contains(event.device());

        topic_match && device_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(raw: &str) -> DeviceAddress {
        DeviceAddress::from(raw)
    }

    #[test]
    fn test_event_topic_mapping() {
        let paired = ChatEvent::Paired {
            device: device("0A"),
        };
        assert_eq!(paired.topic(), EventTopic::Inbound);

        let text = ChatEvent::text_received(device("0A"), "polls");
        assert_eq!(text.topic(), EventTopic::Inbound);

        let reply = ChatEvent::TextOutbound {
            device: device("0A"),
            body: "hi".into(),
        };
        assert_eq!(reply.topic(), EventTopic::Outbound);
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        let event = ChatEvent::text_received(device("0A"), "stats");
        assert!(filter.matches(&event));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Outbound]);

        let reply = ChatEvent::TextOutbound {
            device: device("0A"),
            body: "hi".into(),
        };
        assert!(filter.matches(&reply));

        let inbound = ChatEvent::text_received(device("0A"), "polls");
        assert!(!filter.matches(&inbound));
    }

    #[test]
    fn test_filter_by_device() {
        let filter = EventFilter::for_devices(vec![device("0A")]);

        assert!(filter.matches(&ChatEvent::text_received(device("0A"), "x")));
        assert!(!filter.matches(&ChatEvent::text_received(device("0B"), "x")));
    }

    #[test]
    fn test_text_received_ids_are_unique() {
        let a = ChatEvent::text_received(device("0A"), "x");
        let b = ChatEvent::text_received(device("0A"), "x");
        assert!(a.message_id().is_some());
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn test_only_inbound_text_has_message_id() {
        let paired = ChatEvent::Paired {
            device: device("0A"),
        };
        let reply = ChatEvent::TextOutbound {
            device: device("0A"),
            body: "hi".into(),
        };
        assert_eq!(paired.message_id(), None);
        assert_eq!(reply.message_id(), None);
    }
}
