use crate::EngineObserver;
use parking_lot::{Mutex, RwLock};
use plancore::{FlowError, HolderId, Result, Transition, TransitionError};
use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Where mapped handlers run.
#[derive(Debug, Clone)]
pub enum DispatchMode {
    /// On the thread that raised "triggered"; handler errors are returned to it.
    Synchronous,
    /// On the blocking pool of the given runtime; errors go to the fault channel.
    Asynchronous(Handle),
}

/// A handler that failed on the worker pool.
#[derive(Debug)]
pub struct DispatchFault {
    pub transition_id: HolderId,
    pub transition_name: String,
    pub error: FlowError,
}

type Invocation = Box<dyn FnOnce() -> Result<()> + Send>;
type Matcher = Box<dyn Fn(&Arc<dyn Transition>) -> Option<Invocation> + Send + Sync>;

struct Registration {
    type_name: &'static str,
    matcher: Matcher,
}

/// Routes fired transitions to application handlers by concrete type.
///
/// Registrations are tried in the order they were made and the first one
/// whose type matches the fired transition handles it; later matches never
/// run. A transition nobody registered for is dropped without error.
pub struct TransitionMapper {
    mode: DispatchMode,
    registrations: RwLock<Vec<Registration>>,
    /// Keyed by transition allocation, so equal ids in different instances
    /// never share a gate.
    gates: Mutex<HashMap<usize, Arc<Mutex<()>>>>,
    faults: mpsc::UnboundedSender<DispatchFault>,
    fault_receiver: Mutex<Option<mpsc::UnboundedReceiver<DispatchFault>>>,
}

impl TransitionMapper {
    pub fn new(mode: DispatchMode) -> Self {
        let (faults, fault_receiver) = mpsc::unbounded_channel();
        Self {
            mode,
            registrations: RwLock::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            faults,
            fault_receiver: Mutex::new(Some(fault_receiver)),
        }
    }

    pub fn synchronous() -> Self {
        Self::new(DispatchMode::Synchronous)
    }

    pub fn asynchronous(handle: Handle) -> Self {
        Self::new(DispatchMode::Asynchronous(handle))
    }

    pub fn mode(&self) -> &DispatchMode {
        &self.mode
    }

    /// Register `handler` for transitions of concrete type `T`.
    pub fn map<T, F>(&self, handler: F) -> &Self
    where
        T: Transition,
        F: Fn(Arc<T>) -> Result<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let matcher: Matcher = Box::new(move |transition: &Arc<dyn Transition>| {
            let concrete = Arc::clone(transition).into_any().downcast::<T>().ok()?;
            let handler = Arc::clone(&handler);
            Some(Box::new(move || handler(concrete)) as Invocation)
        });

        tracing::debug!("Mapping transitions of type {}", type_name::<T>());
        self.registrations.write().push(Registration {
            type_name: type_name::<T>(),
            matcher,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Run the first matching handler. Returns whether one matched.
    pub fn dispatch(&self, transition: &Arc<dyn Transition>) -> Result<bool> {
        let matched = self
            .registrations
            .read()
            .iter()
            .find_map(|r| (r.matcher)(transition).map(|invocation| (r.type_name, invocation)));

        let Some((type_name, invocation)) = matched else {
            tracing::debug!(
                "No handler mapped for transition {} ({}), dropping",
                transition.id(),
                transition.name()
            );
            return Ok(false);
        };

        tracing::debug!(
            "Dispatching transition {} ({}) to handler for {}",
            transition.id(),
            transition.name(),
            type_name
        );
        match &self.mode {
            DispatchMode::Synchronous => invocation()?,
            DispatchMode::Asynchronous(handle) => self.spawn(handle, transition, invocation),
        }
        Ok(true)
    }

    fn spawn(&self, handle: &Handle, transition: &Arc<dyn Transition>, invocation: Invocation) {
        let gate = self.gate(transition);
        let worker = handle.spawn_blocking(move || {
            // One handler at a time per transition instance.
            let _turn = gate.lock();
            invocation()
        });

        let transition = Arc::clone(transition);
        let faults = self.faults.clone();
        handle.spawn(async move {
            let error = match worker.await {
                Ok(Ok(())) => return,
                Ok(Err(error)) => error,
                Err(_) => FlowError::from(TransitionError::HandlerPanicked(transition.id())),
            };

            tracing::error!(
                "Handler for transition {} ({}) failed: {}",
                transition.id(),
                transition.name(),
                error
            );
            transition.fault(&error);
            let _ = faults.send(DispatchFault {
                transition_id: transition.id(),
                transition_name: transition.name().to_string(),
                error,
            });
        });
    }

    fn gate(&self, transition: &Arc<dyn Transition>) -> Arc<Mutex<()>> {
        let key = Arc::as_ptr(transition) as *const () as usize;
        Arc::clone(self.gates.lock().entry(key).or_default())
    }

    /// Receiver for failures of asynchronously dispatched handlers. Only the
    /// first call gets it.
    pub fn take_faults(&self) -> Option<mpsc::UnboundedReceiver<DispatchFault>> {
        self.fault_receiver.lock().take()
    }

    /// Drop every registration, releasing whatever the handlers captured.
    pub fn dispose(&self) {
        let dropped = {
            let mut registrations = self.registrations.write();
            std::mem::take(&mut *registrations)
        };
        self.gates.lock().clear();
        tracing::debug!("Transition mapper disposed {} registration(s)", dropped.len());
    }
}

impl EngineObserver for TransitionMapper {
    fn transition_triggered(&self, transition: &Arc<dyn Transition>) -> Result<()> {
        self.dispatch(transition).map(|_| ())
    }
}
