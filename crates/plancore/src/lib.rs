//! Core abstractions for the token-flow engine
//!
//! This crate provides the graph data model every other crate builds on:
//! tokens, places, the transition trait, workplans and their executable
//! instances, and the snapshot format used to pause and resume execution.

mod classification;
mod error;
pub mod events;
mod holder;
mod instance;
mod place;
mod snapshot;
mod state;
mod token;
mod tracker;
mod transition;
mod workplan;

pub use classification::NodeClassification;
pub use error::{EngineError, FlowError, SnapshotError, TransitionError, WorkplanError};
pub use events::{EngineEvent, EngineId, EventBus};
pub use holder::Holder;
pub use instance::WorkplanInstance;
pub use place::{Place, PlaceListener};
pub use snapshot::{HolderSnapshot, WorkplanSnapshot};
pub use state::EngineState;
pub use token::{MainToken, SplitToken, Token, TokenId};
pub use tracker::ExecutionTracker;
pub use transition::{
    AsAny, FiringGuard, Transition, TransitionContext, TransitionCore, TransitionListener,
};
pub use workplan::{Connector, TransitionTemplate, Workplan, WorkplanId};

/// Stable integer id shared by places and transitions of one workplan
pub type HolderId = u64;

/// Handle returned when subscribing to a place or transition signal
pub type SubscriptionId = u64;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
