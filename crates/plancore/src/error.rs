use crate::{EngineState, HolderId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Workplan error: {0}")]
    Workplan(#[from] WorkplanError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Transition {0} used before initialization")]
    NotInitialized(HolderId),

    #[error("Transition {0} was already initialized")]
    AlreadyInitialized(HolderId),

    #[error("Transition {transition} references unknown place {place}")]
    PlaceNotFound { transition: HolderId, place: HolderId },

    #[error("Transition {transition} has no output {result} (outputs: {outputs})")]
    InvalidResult {
        transition: HolderId,
        result: usize,
        outputs: usize,
    },

    #[error("Transition {0} has no running work to complete")]
    NotExecuting(HolderId),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Handler panicked while executing transition {0}")]
    HandlerPanicked(HolderId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkplanError {
    #[error("Holder id {0} is used more than once")]
    DuplicateHolder(HolderId),

    #[error("Place not found: {0}")]
    PlaceNotFound(HolderId),

    #[error("Workplan has no start connector")]
    MissingStart,

    #[error("Workplan has no exit connector")]
    MissingExit,

    #[error("No template for transition {0}")]
    UnknownTransition(HolderId),

    #[error("Template {0} has no compiled transition")]
    MissingTransition(HolderId),

    #[error("Transition {0} is wired differently from its template")]
    WiringMismatch(HolderId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Cannot {operation} while engine is {state}")]
    InvalidTransition {
        state: EngineState,
        operation: &'static str,
    },

    #[error("Snapshot differs from the one taken when the engine paused")]
    SnapshotMismatch,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Snapshot references unknown holder {0}")]
    UnknownHolder(HolderId),

    #[error("Snapshot of workplan '{actual}' cannot restore workplan '{expected}'")]
    WorkplanMismatch { expected: String, actual: String },

    #[error("Holder {holder} rejected its snapshot: {reason}")]
    InvalidState { holder: HolderId, reason: String },
}
