//! Notification gateway trait and test doubles
//!
//! The core publishes events to a realtime transport it never waits on.
//! `publish` is synchronous and infallible from the caller's point of view;
//! delivery problems are the gateway's to log and absorb.

use std::sync::Mutex;

use crate::types::LobbyEvent;

/// Fire-and-forget outbound event channel
pub trait NotificationGateway: Send + Sync {
    /// Hand an event to the transport. Must not block on delivery.
    fn publish(&self, topic: &str, event: LobbyEvent);
}

/// Gateway that drops every event; for tools and benchmarks
#[derive(Debug, Default)]
pub struct NullGateway;

impl NotificationGateway for NullGateway {
    fn publish(&self, _topic: &str, _event: LobbyEvent) {}
}

/// Gateway that records events in memory, for tests
#[derive(Debug, Default)]
pub struct RecordingGateway {
    events: Mutex<Vec<(String, LobbyEvent)>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded (topic, event) pairs in publish order
    pub fn events(&self) -> Vec<(String, LobbyEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded events for one topic
    pub fn events_for(&self, topic: &str) -> Vec<LobbyEvent> {
        self.events()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl NotificationGateway for RecordingGateway {
    fn publish(&self, topic: &str, event: LobbyEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((topic.to_string(), event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::topics;
    use uuid::Uuid;

    #[test]
    fn test_recording_gateway_captures_order() {
        let gateway = RecordingGateway::new();
        let room_id = Uuid::new_v4();

        gateway.publish(
            topics::GAME,
            LobbyEvent::GameStarted { room_id, round: 1 },
        );
        gateway.publish(
            topics::GAME,
            LobbyEvent::PreparationStarted { room_id, round: 1 },
        );

        let events = gateway.events_for(topics::GAME);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LobbyEvent::GameStarted { .. }));
        assert!(matches!(events[1], LobbyEvent::PreparationStarted { .. }));

        gateway.clear();
        assert!(gateway.events().is_empty());
    }
}
