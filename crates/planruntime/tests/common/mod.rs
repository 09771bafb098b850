// Shared fixtures for the runtime integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use plancore::{
    Connector, EngineEvent, HolderId, Place, Result, Token, Transition, TransitionTemplate,
    Workplan, WorkplanInstance,
};
use planruntime::EngineObserver;
use plantransitions::{DummyTransition, JoinTransition, SplitTransition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Reached(HolderId, Token),
    Triggered(HolderId),
    Completed(HolderId, Token),
}

/// Engine observer remembering every callback in order
#[derive(Default)]
pub struct Recorder {
    signals: Mutex<Vec<Signal>>,
}

impl Recorder {
    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn completions(&self) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|s| matches!(s, Signal::Completed(..)))
            .count()
    }
}

impl EngineObserver for Recorder {
    fn place_reached(&self, place: &Arc<Place>, token: &Token) -> Result<()> {
        self.signals
            .lock()
            .push(Signal::Reached(place.id(), token.clone()));
        Ok(())
    }

    fn transition_triggered(&self, transition: &Arc<dyn Transition>) -> Result<()> {
        self.signals.lock().push(Signal::Triggered(transition.id()));
        Ok(())
    }

    fn completed(&self, place: &Arc<Place>, token: &Token) -> Result<()> {
        self.signals
            .lock()
            .push(Signal::Completed(place.id(), token.clone()));
        Ok(())
    }
}

pub fn instance(workplan: Workplan, transitions: Vec<Arc<dyn Transition>>) -> Arc<WorkplanInstance> {
    Arc::new(WorkplanInstance::new(Arc::new(workplan), transitions).unwrap())
}

/// P0(1) -> X(10, observable) -> P1(2) -> Y(11) -> P2(3, exit)
pub fn linear() -> Arc<WorkplanInstance> {
    let x = TransitionTemplate::new(10, "X").with_input(1).with_output(2);
    let y = TransitionTemplate::new(11, "Y").with_input(2).with_output(3);
    let workplan = Workplan::new("linear")
        .with_connector(Connector::start(1, "P0"))
        .with_connector(Connector::intermediate(2, "P1"))
        .with_connector(Connector::exit(3, "P2"))
        .with_transition(x.clone())
        .with_transition(y.clone());
    instance(
        workplan,
        vec![
            Arc::new(DummyTransition::new(x).observable()),
            Arc::new(DummyTransition::new(y)),
        ],
    )
}

/// P0(1) and hold(2) feed join(10) -> done(3, exit). Nothing ever fills
/// `hold`, so a started token stays in P0.
pub fn held_start() -> Arc<WorkplanInstance> {
    let join = TransitionTemplate::new(10, "join")
        .with_input(1)
        .with_input(2)
        .with_output(3);
    let workplan = Workplan::new("held")
        .with_connector(Connector::start(1, "P0"))
        .with_connector(Connector::intermediate(2, "hold"))
        .with_connector(Connector::exit(3, "done"))
        .with_transition(join.clone());
    instance(workplan, vec![Arc::new(JoinTransition::new(join))])
}

/// in(1) -> split(10) -> a(2) -> move(11) -> a2(4)
///                    -> b(3)
/// a2(4), b(3) and gate(5) -> join(12) -> out(6, exit)
///
/// After start the branches wait in `a2` and `b` until something is added
/// to `gate`.
pub fn gated() -> Arc<WorkplanInstance> {
    let split = TransitionTemplate::new(10, "split")
        .with_input(1)
        .with_output(2)
        .with_output(3);
    let carry = TransitionTemplate::new(11, "move").with_input(2).with_output(4);
    let join = TransitionTemplate::new(12, "join")
        .with_input(4)
        .with_input(3)
        .with_input(5)
        .with_output(6);
    let workplan = Workplan::new("gated")
        .with_connector(Connector::start(1, "in"))
        .with_connector(Connector::intermediate(2, "a"))
        .with_connector(Connector::intermediate(3, "b"))
        .with_connector(Connector::intermediate(4, "a2"))
        .with_connector(Connector::intermediate(5, "gate"))
        .with_connector(Connector::exit(6, "out"))
        .with_transition(split.clone())
        .with_transition(carry.clone())
        .with_transition(join.clone());
    instance(
        workplan,
        vec![
            Arc::new(SplitTransition::new(split)),
            Arc::new(DummyTransition::new(carry)),
            Arc::new(JoinTransition::new(join)),
        ],
    )
}

/// Token placement per place, for comparing runs
pub fn placement(instance: &WorkplanInstance) -> Vec<(HolderId, Vec<Token>)> {
    instance
        .places()
        .iter()
        .map(|p| (p.id(), p.tokens()))
        .collect()
}

/// Wait for the engine to report completion, or fail after five seconds.
pub async fn completed(events: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event @ EngineEvent::Completed { .. }) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("engine did not complete in time")
}
