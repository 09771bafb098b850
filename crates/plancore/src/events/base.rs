use crate::{EngineState, HolderId, Token};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type EngineId = Uuid;

/// Events broadcast while an engine drives a workplan instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    StateChanged {
        engine_id: EngineId,
        from: EngineState,
        to: EngineState,
        timestamp: DateTime<Utc>,
    },
    PlaceReached {
        engine_id: EngineId,
        place_id: HolderId,
        place_name: String,
        token: Token,
        timestamp: DateTime<Utc>,
    },
    TransitionTriggered {
        engine_id: EngineId,
        transition_id: HolderId,
        transition_name: String,
        timestamp: DateTime<Utc>,
    },
    Completed {
        engine_id: EngineId,
        place_id: HolderId,
        place_name: String,
        token: Token,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn engine_id(&self) -> EngineId {
        match self {
            EngineEvent::StateChanged { engine_id, .. }
            | EngineEvent::PlaceReached { engine_id, .. }
            | EngineEvent::TransitionTriggered { engine_id, .. }
            | EngineEvent::Completed { engine_id, .. } => *engine_id,
        }
    }
}

/// Fan-out of engine events to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is fine.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
