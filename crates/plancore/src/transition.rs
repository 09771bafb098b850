use crate::{
    ExecutionTracker, FlowError, HolderId, Place, PlaceListener, Result, SnapshotError, SubscriptionId, Token,
    TransitionError, TransitionTemplate,
};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Receives "triggered" signals from observable transitions.
pub trait TransitionListener: Send + Sync {
    fn triggered(&self, transition: &Arc<dyn Transition>) -> Result<()>;
}

/// Upcast to `Any` so dispatchers can recover the concrete transition type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Node that consumes tokens from its input places and produces tokens into
/// its output places.
///
/// Implementors embed a [`TransitionCore`] for wiring, the `executing`
/// counter and trigger listeners, and provide the firing rule in
/// [`Transition::on_token_added`].
pub trait Transition: AsAny {
    fn core(&self) -> &TransitionCore;

    /// Firing rule, called whenever one of the input places announces a token.
    fn on_token_added(&self, place: &Arc<Place>, token: &Token) -> Result<()>;

    /// Resolve places and subscribe to inputs. Must run exactly once.
    fn initialize(&self, ctx: &TransitionContext<'_>) -> Result<()> {
        self.core().initialize(ctx)
    }

    /// Tokens owned by the transition itself.
    fn tokens(&self) -> Vec<Token> {
        self.core().in_flight_tokens()
    }

    /// Internal state stored next to the tokens in a snapshot.
    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Check that `tokens` and `state` could be restored, without applying
    /// them.
    fn check_restore(&self, tokens: &[Token], _state: &serde_json::Value) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        Err(SnapshotError::InvalidState {
            holder: self.id(),
            reason: "transition does not keep tokens between firings".to_string(),
        }
        .into())
    }

    fn restore(&self, tokens: Vec<Token>, state: serde_json::Value) -> Result<()> {
        self.check_restore(&tokens, &state)
    }

    fn pause(&self) {}

    fn resume(&self) -> Result<()> {
        Ok(())
    }

    /// A handler dispatched for this transition failed off-thread.
    fn fault(&self, _error: &FlowError) {}

    fn id(&self) -> HolderId {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn inputs(&self) -> &[HolderId] {
        self.core().inputs()
    }

    fn outputs(&self) -> &[HolderId] {
        self.core().outputs()
    }

    fn executing(&self) -> bool {
        self.core().executing()
    }

    fn is_observable(&self) -> bool {
        self.core().is_observable()
    }

    fn subscribe_triggered(&self, listener: Weak<dyn TransitionListener>) -> SubscriptionId {
        self.core().subscribe_triggered(listener)
    }

    fn unsubscribe_triggered(&self, subscription: SubscriptionId) -> bool {
        self.core().unsubscribe_triggered(subscription)
    }
}

impl fmt::Debug for dyn Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("executing", &self.executing())
            .finish()
    }
}

/// What a transition gets to see while it initializes.
pub struct TransitionContext<'a> {
    places: &'a [Arc<Place>],
    tracker: Arc<ExecutionTracker>,
    this: Weak<dyn Transition>,
}

impl<'a> TransitionContext<'a> {
    pub fn new(
        places: &'a [Arc<Place>],
        tracker: Arc<ExecutionTracker>,
        this: Weak<dyn Transition>,
    ) -> Self {
        Self {
            places,
            tracker,
            this,
        }
    }

    pub fn place(&self, id: HolderId) -> Option<&Arc<Place>> {
        self.places.iter().find(|p| p.id() == id)
    }
}

struct Wiring {
    this: Weak<dyn Transition>,
    inputs: Vec<Arc<Place>>,
    outputs: Vec<Arc<Place>>,
    tracker: Arc<ExecutionTracker>,
    _input_listener: Arc<InputListener>,
}

/// Forwards input place arrivals to the owning transition.
struct InputListener {
    transition: Weak<dyn Transition>,
}

impl PlaceListener for InputListener {
    fn token_added(&self, place: &Arc<Place>, token: &Token) -> Result<()> {
        match self.transition.upgrade() {
            Some(transition) => transition.on_token_added(place, token),
            None => Ok(()),
        }
    }
}

/// Plumbing shared by every transition kind.
pub struct TransitionCore {
    template: TransitionTemplate,
    observable: bool,
    wiring: OnceLock<Wiring>,
    executing: AtomicUsize,
    in_flight: Mutex<Vec<Token>>,
    fire_lock: Mutex<()>,
    listeners: RwLock<Vec<(SubscriptionId, Weak<dyn TransitionListener>)>>,
    next_subscription: AtomicU64,
}

impl TransitionCore {
    pub fn new(template: TransitionTemplate) -> Self {
        Self {
            template,
            observable: false,
            wiring: OnceLock::new(),
            executing: AtomicUsize::new(0),
            in_flight: Mutex::new(Vec::new()),
            fire_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn observable(mut self, observable: bool) -> Self {
        self.observable = observable;
        self
    }

    pub fn id(&self) -> HolderId {
        self.template.id
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn inputs(&self) -> &[HolderId] {
        &self.template.inputs
    }

    pub fn outputs(&self) -> &[HolderId] {
        &self.template.outputs
    }

    pub fn template(&self) -> &TransitionTemplate {
        &self.template
    }

    pub fn is_observable(&self) -> bool {
        self.observable
    }

    pub fn is_initialized(&self) -> bool {
        self.wiring.get().is_some()
    }

    pub fn initialize(&self, ctx: &TransitionContext<'_>) -> Result<()> {
        if self.is_initialized() {
            return Err(TransitionError::AlreadyInitialized(self.id()).into());
        }

        let resolve = |ids: &[HolderId]| -> std::result::Result<Vec<Arc<Place>>, TransitionError> {
            ids.iter()
                .map(|id| {
                    ctx.place(*id).cloned().ok_or(TransitionError::PlaceNotFound {
                        transition: self.id(),
                        place: *id,
                    })
                })
                .collect()
        };
        let inputs = resolve(&self.template.inputs)?;
        let outputs = resolve(&self.template.outputs)?;

        let input_listener = Arc::new(InputListener {
            transition: ctx.this.clone(),
        });
        let weak_listener: Weak<dyn PlaceListener> = {
            let listener: Arc<dyn PlaceListener> = input_listener.clone();
            Arc::downgrade(&listener)
        };

        let wiring = Wiring {
            this: ctx.this.clone(),
            inputs,
            outputs,
            tracker: Arc::clone(&ctx.tracker),
            _input_listener: input_listener,
        };
        if self.wiring.set(wiring).is_err() {
            return Err(TransitionError::AlreadyInitialized(self.id()).into());
        }

        for place in self.input_places()? {
            place.subscribe(weak_listener.clone());
        }
        tracing::debug!(
            "Transition {} ({}) wired: {} input(s), {} output(s)",
            self.id(),
            self.name(),
            self.template.inputs.len(),
            self.template.outputs.len()
        );
        Ok(())
    }

    fn wiring(&self) -> std::result::Result<&Wiring, TransitionError> {
        self.wiring
            .get()
            .ok_or(TransitionError::NotInitialized(self.id()))
    }

    pub fn input_places(&self) -> std::result::Result<&[Arc<Place>], TransitionError> {
        Ok(&self.wiring()?.inputs)
    }

    pub fn output_places(&self) -> std::result::Result<&[Arc<Place>], TransitionError> {
        Ok(&self.wiring()?.outputs)
    }

    /// Output place at `result`, the branch chosen by the transition body.
    pub fn output(&self, result: usize) -> std::result::Result<&Arc<Place>, TransitionError> {
        let outputs = self.output_places()?;
        outputs.get(result).ok_or(TransitionError::InvalidResult {
            transition: self.id(),
            result,
            outputs: outputs.len(),
        })
    }

    /// The transition this core belongs to, as handed to listeners.
    pub fn this(&self) -> Option<Arc<dyn Transition>> {
        self.wiring.get().and_then(|w| w.this.upgrade())
    }

    pub fn executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst) > 0
    }

    /// Mark the start of a firing. Pair with [`TransitionCore::exit_executing`]
    /// or use [`TransitionCore::begin`] for scoped firings.
    pub fn enter_executing(&self) -> std::result::Result<(), TransitionError> {
        let wiring = self.wiring()?;
        self.executing.fetch_add(1, Ordering::SeqCst);
        wiring.tracker.enter();
        Ok(())
    }

    pub fn exit_executing(&self) {
        let previous = self
            .executing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous.is_ok() {
            if let Some(wiring) = self.wiring.get() {
                wiring.tracker.exit();
            }
        }
    }

    pub fn begin(&self) -> std::result::Result<FiringGuard<'_>, TransitionError> {
        self.enter_executing()?;
        Ok(FiringGuard { core: self })
    }

    /// Take one token from every input place, or none at all.
    ///
    /// Taken tokens are tracked as in flight until [`TransitionCore::release`].
    pub fn take_inputs(&self) -> std::result::Result<Option<Vec<Token>>, TransitionError> {
        let inputs = self.input_places()?;
        let _fire = self.fire_lock.lock();

        let mut taken: Vec<(usize, Token)> = Vec::with_capacity(inputs.len());
        for (index, place) in inputs.iter().enumerate() {
            match place.take() {
                Some(token) => taken.push((index, token)),
                None => {
                    for (index, token) in taken.into_iter().rev() {
                        inputs[index].put_back(token);
                    }
                    return Ok(None);
                }
            }
        }

        let tokens: Vec<Token> = taken.into_iter().map(|(_, token)| token).collect();
        self.in_flight.lock().extend(tokens.iter().cloned());
        Ok(Some(tokens))
    }

    /// One complete firing: mark executing, consume one token per input, run
    /// `produce`, then raise "triggered" once no longer executing.
    ///
    /// Returns `false` when the inputs could not all supply a token.
    pub fn fire(&self, produce: impl FnOnce(&[Token]) -> Result<()>) -> Result<bool> {
        let guard = self.begin()?;
        let Some(tokens) = self.take_inputs()? else {
            return Ok(false);
        };
        let produced = produce(&tokens);
        self.release(&tokens);
        drop(guard);

        produced?;
        self.raise_triggered()?;
        Ok(true)
    }

    pub fn release(&self, tokens: &[Token]) {
        let mut in_flight = self.in_flight.lock();
        for token in tokens {
            if let Some(index) = in_flight.iter().position(|t| t == token) {
                in_flight.remove(index);
            }
        }
    }

    pub fn in_flight_tokens(&self) -> Vec<Token> {
        self.in_flight.lock().clone()
    }

    /// Announce a firing to trigger listeners. Non-observable transitions
    /// stay silent.
    pub fn raise_triggered(&self) -> Result<()> {
        if !self.observable {
            return Ok(());
        }
        let Some(this) = self.this() else {
            return Ok(());
        };

        let listeners: Vec<Arc<dyn TransitionListener>> = self
            .listeners
            .read()
            .iter()
            .filter_map(|(_, listener)| listener.upgrade())
            .collect();
        for listener in listeners {
            listener.triggered(&this)?;
        }
        Ok(())
    }

    pub fn subscribe_triggered(&self, listener: Weak<dyn TransitionListener>) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe_triggered(&self, subscription: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription);
        listeners.len() != before
    }
}

/// Keeps a transition marked as executing until dropped.
pub struct FiringGuard<'a> {
    core: &'a TransitionCore,
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        self.core.exit_executing();
    }
}
