use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the broadcast channel behind [`crate::Engine::events`].
    pub event_buffer_size: usize,
    /// Longest sleep between quiescence re-checks while pausing.
    pub quiescence_poll_ms: u64,
}

impl EngineConfig {
    pub fn quiescence_poll(&self) -> Duration {
        Duration::from_millis(self.quiescence_poll_ms.max(1))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            quiescence_poll_ms: 1,
        }
    }
}
