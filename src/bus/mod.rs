//! Event bus for inter-component communication
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! Events are typed and can carry payloads.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::BroadcastSnapshot;

/// Event types that can be published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    // Device link
    DeviceConnected { device_name: String },
    DeviceDisconnected { error: String },

    /// Any change to the broadcast session snapshot
    SessionUpdated { snapshot: Box<BroadcastSnapshot> },

    // Broadcast transitions observed from /status
    LiveStarted { device_name: String },
    LiveEnded,

    PreviewChanged { active: bool },

    /// A user-triggered action failed (start/stop streaming, preview, title)
    ActionFailed { action: String, error: String },

    // Backend session
    SignedIn { username: String },
    SignedOut,
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BusEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    /// Default capacity (256 events)
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub() {
        let bus = create_bus();
        let mut rx = bus.subscribe();

        bus.publish(BusEvent::DeviceConnected {
            device_name: "Wizard-01".to_string(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            BusEvent::DeviceConnected { device_name } => {
                assert_eq!(device_name, "Wizard-01");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = create_bus();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(BusEvent::LiveEnded);

        assert!(matches!(rx1.recv().await.unwrap(), BusEvent::LiveEnded));
        assert!(matches!(rx2.recv().await.unwrap(), BusEvent::LiveEnded));
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(BusEvent::PreviewChanged { active: true }).unwrap();
        assert_eq!(json["type"], "PreviewChanged");
        assert_eq!(json["payload"]["active"], true);
    }
}
