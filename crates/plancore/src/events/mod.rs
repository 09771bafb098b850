// crates/plancore/src/events/mod.rs

mod base;

pub use base::{EngineEvent, EngineId, EventBus};
