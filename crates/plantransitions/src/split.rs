use plancore::{Place, Result, Token, Transition, TransitionCore, TransitionTemplate};
use std::sync::Arc;

/// Sends one branch of every consumed token down each output
pub struct SplitTransition {
    core: TransitionCore,
}

impl SplitTransition {
    pub fn new(template: TransitionTemplate) -> Self {
        Self {
            core: TransitionCore::new(template),
        }
    }

    pub fn observable(mut self) -> Self {
        self.core = self.core.observable(true);
        self
    }
}

impl Transition for SplitTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token_added(&self, _place: &Arc<Place>, _token: &Token) -> Result<()> {
        self.core.fire(|tokens| {
            for output in self.core.output_places()? {
                for token in tokens {
                    output.add(Token::split(token.clone()))?;
                }
            }
            tracing::debug!(
                "Split {} fanned {} token(s) out to {} branch(es)",
                self.core.name(),
                tokens.len(),
                self.core.outputs().len()
            );
            Ok(())
        })?;
        Ok(())
    }
}
