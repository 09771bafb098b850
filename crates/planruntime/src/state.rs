use plancore::{EngineError, EngineState};

/// Externally requested (or, for `Complete`, internally raised) engine
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    Start,
    Pause,
    Restore,
    Destroy,
    Complete,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::Start => "start",
            Operation::Pause => "pause",
            Operation::Restore => "restore",
            Operation::Destroy => "destroy",
            Operation::Complete => "complete",
        }
    }
}

/// How the engine carries out an operation that can be accepted in more
/// than one way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    InjectStartTokens,
    ResumeHolders,
    ApplySnapshot,
    VerifySnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: EngineState,
    /// `None` for operations with a single outcome.
    pub action: Option<Action>,
}

/// The engine's state table. Anything not listed is a state-machine
/// violation.
pub fn step(state: EngineState, operation: Operation) -> Result<Step, EngineError> {
    use Action::*;
    use EngineState::*;

    let (next, action) = match (state, operation) {
        (Ready, Operation::Initialize) => (Initializing, None),
        (Initializing, Operation::Start) => (Running, Some(InjectStartTokens)),
        (Initializing, Operation::Restore) => (Restored, Some(ApplySnapshot)),
        (Restored, Operation::Start) => (Running, Some(ResumeHolders)),
        (Running, Operation::Pause) => (Paused, None),
        (Paused, Operation::Start) => (Running, Some(ResumeHolders)),
        (Paused, Operation::Restore) => (Paused, Some(VerifySnapshot)),
        (Running, Operation::Complete) => (Completed, None),
        (Destroyed, Operation::Destroy) => {
            return Err(EngineError::InvalidTransition {
                state,
                operation: operation.name(),
            })
        }
        (_, Operation::Destroy) => (Destroyed, None),
        _ => {
            return Err(EngineError::InvalidTransition {
                state,
                operation: operation.name(),
            })
        }
    };
    Ok(Step { next, action })
}
