use plancore::{Place, Result, Token, Transition};
use std::sync::Arc;

/// Synchronous subscriber to engine-level signals.
///
/// Callbacks run on whichever thread moved the token, in subscription order.
/// An error returned here travels back to the code that moved the token.
pub trait EngineObserver: Send + Sync {
    /// An intermediate place received a token.
    fn place_reached(&self, _place: &Arc<Place>, _token: &Token) -> Result<()> {
        Ok(())
    }

    /// An observable transition fired.
    fn transition_triggered(&self, _transition: &Arc<dyn Transition>) -> Result<()> {
        Ok(())
    }

    /// The engine reached a terminal place.
    fn completed(&self, _place: &Arc<Place>, _token: &Token) -> Result<()> {
        Ok(())
    }
}
