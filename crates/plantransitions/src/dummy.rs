use plancore::{Place, Result, Token, Transition, TransitionCore, TransitionTemplate};
use std::sync::Arc;

/// Moves every token from its input to its first output unchanged
pub struct DummyTransition {
    core: TransitionCore,
}

impl DummyTransition {
    pub fn new(template: TransitionTemplate) -> Self {
        Self {
            core: TransitionCore::new(template),
        }
    }

    /// Raise "triggered" after each firing.
    pub fn observable(mut self) -> Self {
        self.core = self.core.observable(true);
        self
    }
}

impl Transition for DummyTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token_added(&self, _place: &Arc<Place>, _token: &Token) -> Result<()> {
        self.core.fire(|tokens| {
            let output = self.core.output(0)?;
            for token in tokens {
                output.add(token.clone())?;
            }
            Ok(())
        })?;
        Ok(())
    }
}
