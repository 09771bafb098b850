use crate::state::{self, Action, Operation};
use crate::{topology, EngineConfig, EngineObserver};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use plancore::{
    EngineError, EngineEvent, EngineId, EngineState, EventBus, NodeClassification, Place,
    PlaceListener, Result, SnapshotError, SubscriptionId, Token, Transition, TransitionListener,
    WorkplanInstance, WorkplanSnapshot,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Drives one workplan instance from start to completion.
///
/// Control operations (`initialize`, `start`, `pause`, `restore`,
/// `destroy`) run on the calling thread. Token movement happens wherever
/// tokens are added: on the caller during `start`/`resume`, or on worker
/// threads when transitions complete asynchronously. The engine is the only
/// component that changes the run state of the instance.
pub struct Engine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    id: EngineId,
    config: EngineConfig,
    control: Mutex<Control>,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn EngineObserver>)>>,
    next_observer: AtomicU64,
    events: EventBus,
}

struct Control {
    state: EngineState,
    instance: Option<Arc<WorkplanInstance>>,
    snapshot: Option<WorkplanSnapshot>,
    subscriptions: Vec<Subscription>,
}

enum Subscription {
    Place(Arc<Place>, SubscriptionId),
    Transition(Arc<dyn Transition>, SubscriptionId),
}

impl Subscription {
    fn cancel(self) {
        match self {
            Subscription::Place(place, id) => {
                place.unsubscribe(id);
            }
            Subscription::Transition(transition, id) => {
                transition.unsubscribe_triggered(id);
            }
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let events = EventBus::new(config.event_buffer_size);
        Self {
            shared: Arc::new(EngineShared {
                id: Uuid::new_v4(),
                config,
                control: Mutex::new(Control {
                    state: EngineState::Ready,
                    instance: None,
                    snapshot: None,
                    subscriptions: Vec::new(),
                }),
                observers: RwLock::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn id(&self) -> EngineId {
        self.shared.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> EngineState {
        self.shared.control.lock().state
    }

    pub fn instance(&self) -> Option<Arc<WorkplanInstance>> {
        self.shared.control.lock().instance.clone()
    }

    /// Snapshot produced by the last pause, or applied by the last restore.
    pub fn current_snapshot(&self) -> Option<WorkplanSnapshot> {
        self.shared.control.lock().snapshot.clone()
    }

    pub fn subscribe(&self, observer: Arc<dyn EngineObserver>) -> SubscriptionId {
        let id = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);
        self.shared.observers.write().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut observers = self.shared.observers.write();
        let before = observers.len();
        observers.retain(|(id, _)| *id != subscription);
        observers.len() != before
    }

    /// Subscribe to the broadcast of engine events
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Bind the engine to `instance`: initialize every transition and listen
    /// to every place and every observable transition.
    pub fn initialize(&self, instance: Arc<WorkplanInstance>) -> Result<()> {
        let mut control = self.shared.control.lock();
        let step = state::step(control.state, Operation::Initialize)?;

        // The engine hears about an arrival before the transitions consuming it.
        let place_listener: Arc<dyn PlaceListener> = self.shared.clone();
        for place in instance.places() {
            let id = place.subscribe(Arc::downgrade(&place_listener));
            control
                .subscriptions
                .push(Subscription::Place(Arc::clone(place), id));
        }
        if let Err(e) = instance.initialize_transitions() {
            for subscription in control.subscriptions.drain(..) {
                subscription.cancel();
            }
            return Err(e);
        }

        let transition_listener: Arc<dyn TransitionListener> = self.shared.clone();
        for transition in instance.transitions().iter().filter(|t| t.is_observable()) {
            let id = transition.subscribe_triggered(Arc::downgrade(&transition_listener));
            control
                .subscriptions
                .push(Subscription::Transition(Arc::clone(transition), id));
        }

        let unreachable = topology::unreachable_places(&instance);
        if !unreachable.is_empty() {
            tracing::warn!(
                "Workplan '{}' has places no start place can reach: {:?}",
                instance.workplan().name,
                unreachable
            );
        }

        tracing::info!(
            "Engine {} bound to workplan '{}' v{} ({} places, {} transitions)",
            self.shared.id,
            instance.workplan().name,
            instance.workplan().version,
            instance.places().len(),
            instance.transitions().len()
        );
        control.instance = Some(instance);
        let from = std::mem::replace(&mut control.state, step.next);
        drop(control);

        self.shared.state_changed(from, step.next);
        Ok(())
    }

    /// Start a freshly initialized engine, or resume a paused or restored one.
    pub fn start(&self) -> Result<()> {
        let (from, step, instance) = self.shared.advance(Operation::Start)?;
        self.shared.state_changed(from, step.next);

        match step.action {
            Some(Action::InjectStartTokens) => {
                for place in instance.start_places() {
                    tracing::debug!("Injecting main token into start place {}", place.name());
                    place.add(Token::main())?;
                }
                Ok(())
            }
            Some(Action::ResumeHolders) => self.shared.resume_holders(&instance),
            _ => Err(EngineError::InvalidTransition {
                state: from,
                operation: Operation::Start.name(),
            }
            .into()),
        }
    }

    /// Continue a paused or restored engine.
    pub fn resume(&self) -> Result<()> {
        let state = self.state();
        if !matches!(state, EngineState::Paused | EngineState::Restored) {
            return Err(EngineError::InvalidTransition {
                state,
                operation: "resume",
            }
            .into());
        }
        self.start()
    }

    /// Suspend every holder, wait until no transition is executing and
    /// capture the token placement.
    ///
    /// Blocks for as long as any transition stays mid-fire.
    pub fn pause(&self) -> Result<WorkplanSnapshot> {
        let (from, step, instance) = self.shared.advance(Operation::Pause)?;
        self.shared.state_changed(from, step.next);

        let mut snapshot = WorkplanSnapshot::new(instance.workplan().name.clone());

        // Places come first, so a transition that is not carrying tokens by
        // the time it is checked can no longer pick any up.
        for holder in instance.holders() {
            if holder.is_relevant() {
                holder.pause();
            }
        }

        let poll = self.shared.config.quiescence_poll();
        instance
            .tracker()
            .wait_idle(poll, || instance.any_executing());

        for holder in instance.holders() {
            if let Some(entry) = holder.snapshot() {
                snapshot.holders.push(entry);
            }
        }

        tracing::info!(
            "Engine {} paused with {} token(s) in {} holder(s)",
            self.shared.id,
            snapshot.token_count(),
            snapshot.holders.len()
        );
        self.shared.control.lock().snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Apply `snapshot` to a freshly initialized engine.
    ///
    /// On a paused engine only the snapshot taken by that pause is accepted,
    /// and restoring it changes nothing.
    pub fn restore(&self, snapshot: WorkplanSnapshot) -> Result<()> {
        let mut control = self.shared.control.lock();
        let step = state::step(control.state, Operation::Restore)?;

        match step.action {
            Some(Action::ApplySnapshot) => {}
            Some(Action::VerifySnapshot) => {
                return if control.snapshot.as_ref() == Some(&snapshot) {
                    Ok(())
                } else {
                    Err(EngineError::SnapshotMismatch.into())
                };
            }
            _ => {
                return Err(EngineError::InvalidTransition {
                    state: control.state,
                    operation: Operation::Restore.name(),
                }
                .into())
            }
        }

        let instance = control.instance.clone().ok_or(EngineError::InvalidTransition {
            state: control.state,
            operation: Operation::Restore.name(),
        })?;

        let workplan = &instance.workplan().name;
        if snapshot.workplan_name != *workplan {
            return Err(SnapshotError::WorkplanMismatch {
                expected: workplan.clone(),
                actual: snapshot.workplan_name,
            }
            .into());
        }

        // Every entry is checked before any holder changes.
        let mut targets = Vec::with_capacity(snapshot.holders.len());
        for entry in &snapshot.holders {
            let holder = instance
                .holder(entry.holder_id)
                .ok_or(SnapshotError::UnknownHolder(entry.holder_id))?;
            holder.check_restore(&entry.tokens, &entry.state)?;
            targets.push((holder, entry));
        }

        // Keep restored tokens quiet until the engine is started.
        for place in instance.places() {
            place.pause();
        }
        for (holder, entry) in &targets {
            if let Err(e) = holder.restore(entry.tokens.clone(), entry.state.clone()) {
                tracing::error!(
                    "Engine {} failed to restore holder {}: {}",
                    self.shared.id,
                    holder.id(),
                    e
                );
                self.shared.rollback_restore(&instance);
                return Err(e);
            }
        }

        tracing::info!(
            "Engine {} restored {} token(s) into workplan '{}'",
            self.shared.id,
            snapshot.token_count(),
            workplan
        );
        control.snapshot = Some(snapshot);
        let from = std::mem::replace(&mut control.state, step.next);
        drop(control);

        self.shared.state_changed(from, step.next);
        Ok(())
    }

    /// Drop every subscription and release the instance.
    pub fn destroy(&self) -> Result<()> {
        let mut control = self.shared.control.lock();
        let step = state::step(control.state, Operation::Destroy)?;

        for subscription in control.subscriptions.drain(..) {
            subscription.cancel();
        }
        control.instance = None;
        let from = std::mem::replace(&mut control.state, step.next);
        drop(control);

        tracing::info!("Engine {} destroyed", self.shared.id);
        self.shared.state_changed(from, step.next);
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineShared {
    /// Accept `operation` and move to the next state, handing back the bound
    /// instance for the follow-up work.
    fn advance(
        &self,
        operation: Operation,
    ) -> Result<(EngineState, state::Step, Arc<WorkplanInstance>)> {
        let mut control = self.control.lock();
        let step = state::step(control.state, operation)?;
        let instance = control.instance.clone().ok_or(EngineError::InvalidTransition {
            state: control.state,
            operation: operation.name(),
        })?;
        let from = std::mem::replace(&mut control.state, step.next);
        Ok((from, step, instance))
    }

    /// Return a partially restored instance to its freshly initialized
    /// shape: every holder empty, every place live again.
    fn rollback_restore(&self, instance: &WorkplanInstance) {
        for transition in instance.transitions() {
            if let Err(e) = transition.restore(Vec::new(), serde_json::Value::Null) {
                tracing::warn!("Transition {} kept its restored state: {}", transition.id(), e);
            }
        }
        for place in instance.places() {
            place.restore(Vec::new());
            // Nothing left to announce, so this only lifts the pause.
            if let Err(e) = place.resume() {
                tracing::warn!("Place {} did not resume after rollback: {}", place.id(), e);
            }
        }
    }

    fn state_changed(&self, from: EngineState, to: EngineState) {
        if from == to {
            return;
        }
        tracing::debug!("Engine {} state {} -> {}", self.id, from, to);
        self.events.emit(EngineEvent::StateChanged {
            engine_id: self.id,
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    /// Transitions carrying tokens first: whatever they release lands in
    /// places that are still paused. Then every place re-announces its tokens.
    fn resume_holders(&self, instance: &WorkplanInstance) -> Result<()> {
        let carrying: Vec<Arc<dyn Transition>> = instance
            .transitions()
            .iter()
            .filter(|t| !t.tokens().is_empty())
            .cloned()
            .collect();
        for transition in carrying {
            transition.resume()?;
        }
        for place in instance.places() {
            place.resume()?;
        }
        tracing::info!("Engine {} resumed", self.id);
        Ok(())
    }

    fn observers(&self) -> Vec<Arc<dyn EngineObserver>> {
        self.observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn complete(&self, place: &Arc<Place>, token: &Token) -> Result<()> {
        let finished = {
            let mut control = self.control.lock();
            match state::step(control.state, Operation::Complete) {
                Ok(step) => {
                    control.state = step.next;
                    true
                }
                Err(_) => false,
            }
        };
        if !finished {
            tracing::debug!(
                "Token {} reached exit {} but the engine is not running",
                token,
                place.name()
            );
            return Ok(());
        }

        tracing::info!(
            "Engine {} completed at place {} ({})",
            self.id,
            place.name(),
            place.classification()
        );
        self.state_changed(EngineState::Running, EngineState::Completed);
        self.events.emit(EngineEvent::Completed {
            engine_id: self.id,
            place_id: place.id(),
            place_name: place.name().to_string(),
            token: token.clone(),
            timestamp: Utc::now(),
        });
        for observer in self.observers() {
            observer.completed(place, token)?;
        }
        Ok(())
    }
}

impl PlaceListener for EngineShared {
    fn token_added(&self, place: &Arc<Place>, token: &Token) -> Result<()> {
        let classification = place.classification();

        if classification.contains(NodeClassification::EXIT)
            && (classification.contains(NodeClassification::FAILED) || token.is_main())
        {
            return self.complete(place, token);
        }

        if classification.contains(NodeClassification::INTERMEDIATE) {
            tracing::debug!("Token {} reached place {}", token, place.name());
            self.events.emit(EngineEvent::PlaceReached {
                engine_id: self.id,
                place_id: place.id(),
                place_name: place.name().to_string(),
                token: token.clone(),
                timestamp: Utc::now(),
            });
            for observer in self.observers() {
                observer.place_reached(place, token)?;
            }
        }
        Ok(())
    }
}

impl TransitionListener for EngineShared {
    fn triggered(&self, transition: &Arc<dyn Transition>) -> Result<()> {
        self.events.emit(EngineEvent::TransitionTriggered {
            engine_id: self.id,
            transition_id: transition.id(),
            transition_name: transition.name().to_string(),
            timestamp: Utc::now(),
        });
        for observer in self.observers() {
            observer.transition_triggered(transition)?;
        }
        Ok(())
    }
}
