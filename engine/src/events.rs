//! Observable engine state.
//!
//! Consumers subscribe to an [`EventBus`] instead of polling the store. Slow
//! subscribers miss events once their buffer fills; a missed event never
//! blocks the engine.

use crate::{ConflictId, ConflictType, EntityId, EntityType};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Something that happened to a conflict or a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictEvent {
    #[serde(rename_all = "camelCase")]
    Registered {
        conflict_id: ConflictId,
        entity_type: EntityType,
        entity_id: EntityId,
        conflict_type: ConflictType,
    },
    #[serde(rename_all = "camelCase")]
    Resolved {
        conflict_id: ConflictId,
        entity_type: EntityType,
        entity_id: EntityId,
    },
    #[serde(rename_all = "camelCase")]
    Failed { conflict_id: ConflictId, error: String },
    #[serde(rename_all = "camelCase")]
    Reopened { conflict_id: ConflictId },
    BatchStarted { total: usize },
    #[serde(rename_all = "camelCase")]
    BatchProgress {
        completed: usize,
        total: usize,
        conflict_id: ConflictId,
    },
    BatchFinished {
        resolved: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Broadcast channel for [`ConflictEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConflictEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConflictEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: ConflictEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::EngineConfig::default().event_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(ConflictEvent::BatchStarted { total: 3 });

        assert_eq!(rx.recv().await.unwrap(), ConflictEvent::BatchStarted { total: 3 });
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn publish_without_subscribers() {
        let bus = EventBus::new(8);
        bus.publish(ConflictEvent::BatchStarted { total: 0 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn wire_format() {
        let event = ConflictEvent::BatchProgress {
            completed: 2,
            total: 5,
            conflict_id: uuid::Uuid::nil(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "batch_progress",
                "completed": 2,
                "total": 5,
                "conflictId": "00000000-0000-0000-0000-000000000000"
            })
        );
    }
}
