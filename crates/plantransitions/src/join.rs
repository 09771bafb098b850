use plancore::{Place, Result, Token, Transition, TransitionCore, TransitionTemplate};
use std::sync::Arc;

/// Waits for a token on every input and recombines split branches
pub struct JoinTransition {
    core: TransitionCore,
}

impl JoinTransition {
    pub fn new(template: TransitionTemplate) -> Self {
        Self {
            core: TransitionCore::new(template),
        }
    }

    pub fn observable(mut self) -> Self {
        self.core = self.core.observable(true);
        self
    }

    /// Unwrap one split layer from each branch. Branches of the same origin
    /// collapse into that origin; otherwise the first branch wins.
    fn merge(&self, tokens: &[Token]) -> Option<Token> {
        let mut unwrapped = tokens
            .iter()
            .map(|token| token.original().unwrap_or(token).clone());
        let first = unwrapped.next()?;
        if unwrapped.any(|other| other != first) {
            tracing::warn!(
                "Join {} merged branches of different origins, keeping {}",
                self.core.name(),
                first
            );
        }
        Some(first)
    }
}

impl Transition for JoinTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token_added(&self, _place: &Arc<Place>, _token: &Token) -> Result<()> {
        self.core.fire(|tokens| {
            let output = self.core.output(0)?;
            match self.merge(tokens) {
                Some(merged) => output.add(merged),
                None => Ok(()),
            }
        })?;
        Ok(())
    }
}
