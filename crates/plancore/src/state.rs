use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// No instance bound.
    Ready,
    Initializing,
    Running,
    Paused,
    Restored,
    Completed,
    Destroyed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Ready => "ready",
            EngineState::Initializing => "initializing",
            EngineState::Running => "running",
            EngineState::Paused => "paused",
            EngineState::Restored => "restored",
            EngineState::Completed => "completed",
            EngineState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
