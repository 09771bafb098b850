//! Workplan execution runtime
//!
//! This crate provides the engine that drives a workplan instance through
//! start, pause, restore and completion, and the transition mapper that
//! routes fired transitions to application handlers.

mod config;
mod engine;
mod mapper;
mod observer;
pub mod state;
pub mod topology;

pub use config::EngineConfig;
pub use engine::Engine;
pub use mapper::{DispatchFault, DispatchMode, TransitionMapper};
pub use observer::EngineObserver;
pub use state::Operation;
