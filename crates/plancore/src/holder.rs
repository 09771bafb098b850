use crate::{HolderId, HolderSnapshot, Place, Result, SnapshotError, Token, Transition};
use std::sync::Arc;

/// Anything that can carry tokens: a place or a transition.
#[derive(Clone)]
pub enum Holder {
    Place(Arc<Place>),
    Transition(Arc<dyn Transition>),
}

impl Holder {
    pub fn id(&self) -> HolderId {
        match self {
            Holder::Place(p) => p.id(),
            Holder::Transition(t) => t.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Holder::Place(p) => p.name(),
            Holder::Transition(t) => t.name(),
        }
    }

    pub fn tokens(&self) -> Vec<Token> {
        match self {
            Holder::Place(p) => p.tokens(),
            Holder::Transition(t) => t.tokens(),
        }
    }

    pub fn state(&self) -> serde_json::Value {
        match self {
            Holder::Place(_) => serde_json::Value::Null,
            Holder::Transition(t) => t.state(),
        }
    }

    /// Places always take part in pause and resume; transitions only while
    /// they carry tokens.
    pub fn is_relevant(&self) -> bool {
        match self {
            Holder::Place(_) => true,
            Holder::Transition(t) => !t.tokens().is_empty(),
        }
    }

    pub fn pause(&self) {
        match self {
            Holder::Place(p) => p.pause(),
            Holder::Transition(t) => t.pause(),
        }
    }

    pub fn resume(&self) -> Result<()> {
        match self {
            Holder::Place(p) => p.resume(),
            Holder::Transition(t) => t.resume(),
        }
    }

    /// Whether [`Holder::restore`] would accept `tokens` and `state`.
    pub fn check_restore(&self, tokens: &[Token], state: &serde_json::Value) -> Result<()> {
        match self {
            Holder::Place(p) if !state.is_null() => Err(SnapshotError::InvalidState {
                holder: p.id(),
                reason: "places carry no internal state".to_string(),
            }
            .into()),
            Holder::Place(_) => Ok(()),
            Holder::Transition(t) => t.check_restore(tokens, state),
        }
    }

    pub fn restore(&self, tokens: Vec<Token>, state: serde_json::Value) -> Result<()> {
        match self {
            Holder::Place(p) => {
                self.check_restore(&tokens, &state)?;
                p.restore(tokens);
                Ok(())
            }
            Holder::Transition(t) => t.restore(tokens, state),
        }
    }

    /// Snapshot entry, if the holder carries anything.
    pub fn snapshot(&self) -> Option<HolderSnapshot> {
        let tokens = self.tokens();
        if tokens.is_empty() {
            return None;
        }
        Some(HolderSnapshot::new(self.id(), tokens, self.state()))
    }
}

impl std::fmt::Debug for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Holder::Place(p) => std::fmt::Debug::fmt(p.as_ref(), f),
            Holder::Transition(t) => std::fmt::Debug::fmt(t.as_ref(), f),
        }
    }
}
