//! Messaging gateway that hands replies to the chat bus.

use async_trait::async_trait;
use shared_bus::{ChatEvent, EventPublisher};
use shared_types::entities::DeviceAddress;
use std::sync::Arc;

use crate::domain::errors::PollBotError;
use crate::ports::outbound::MessagingGateway;

/// Publishes every reply as [`ChatEvent::TextOutbound`].
///
/// A reply nobody is subscribed to is a delivery failure.
pub struct BusMessenger {
    bus: Arc<dyn EventPublisher>,
}

impl BusMessenger {
    pub fn new(bus: Arc<dyn EventPublisher>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl MessagingGateway for BusMessenger {
    async fn send_text(&self, device: &DeviceAddress, body: String) -> Result<(), PollBotError> {
        let event = ChatEvent::TextOutbound {
            device: device.clone(),
            body,
        };
        if self.bus.publish(event).await == 0 {
            return Err(PollBotError::Delivery {
                device: device.clone(),
                reason: "no outbound subscriber".to_string(),
            });
        }
        Ok(())
    }
}
