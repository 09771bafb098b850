//! Standard transition library
//!
//! Transition kinds a workplan compiler can emit: pass-through, split, join
//! and externally executed tasks.

mod dummy;
mod join;
mod split;
mod task;

pub use dummy::DummyTransition;
pub use join::JoinTransition;
pub use split::SplitTransition;
pub use task::{TaskStatus, TaskTransition};
