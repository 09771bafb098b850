use crate::{
    ExecutionTracker, Holder, HolderId, NodeClassification, Place, Result, Transition,
    TransitionContext, Workplan, WorkplanError,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Executable counterpart of a [`Workplan`].
///
/// Places are created from the workplan's connectors; transitions come
/// already compiled from the caller and are matched to their templates by
/// id. Holders reference each other by id only and are looked up here.
pub struct WorkplanInstance {
    workplan: Arc<Workplan>,
    places: Vec<Arc<Place>>,
    transitions: Vec<Arc<dyn Transition>>,
    tracker: Arc<ExecutionTracker>,
}

impl WorkplanInstance {
    pub fn new(
        workplan: Arc<Workplan>,
        transitions: Vec<Arc<dyn Transition>>,
    ) -> std::result::Result<Self, WorkplanError> {
        workplan.validate()?;

        let mut seen: HashSet<HolderId> = workplan.connectors.iter().map(|c| c.id).collect();
        for transition in &transitions {
            let template = workplan
                .find_transition(transition.id())
                .ok_or(WorkplanError::UnknownTransition(transition.id()))?;
            if !seen.insert(transition.id()) {
                return Err(WorkplanError::DuplicateHolder(transition.id()));
            }
            if template.inputs != transition.inputs() || template.outputs != transition.outputs() {
                return Err(WorkplanError::WiringMismatch(transition.id()));
            }
        }
        if let Some(missing) = workplan.transitions.iter().find(|t| !seen.contains(&t.id)) {
            return Err(WorkplanError::MissingTransition(missing.id));
        }

        let places = workplan
            .connectors
            .iter()
            .map(|c| Arc::new(c.create_place()))
            .collect();

        Ok(Self {
            workplan,
            places,
            transitions,
            tracker: Arc::new(ExecutionTracker::new()),
        })
    }

    pub fn workplan(&self) -> &Arc<Workplan> {
        &self.workplan
    }

    pub fn places(&self) -> &[Arc<Place>] {
        &self.places
    }

    pub fn transitions(&self) -> &[Arc<dyn Transition>] {
        &self.transitions
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    pub fn place(&self, id: HolderId) -> Option<&Arc<Place>> {
        self.places.iter().find(|p| p.id() == id)
    }

    pub fn transition(&self, id: HolderId) -> Option<&Arc<dyn Transition>> {
        self.transitions.iter().find(|t| t.id() == id)
    }

    pub fn holder(&self, id: HolderId) -> Option<Holder> {
        self.place(id)
            .map(|p| Holder::Place(Arc::clone(p)))
            .or_else(|| self.transition(id).map(|t| Holder::Transition(Arc::clone(t))))
    }

    /// Places first, then transitions, each in definition order.
    pub fn holders(&self) -> Vec<Holder> {
        self.places
            .iter()
            .map(|p| Holder::Place(Arc::clone(p)))
            .chain(self.transitions.iter().map(|t| Holder::Transition(Arc::clone(t))))
            .collect()
    }

    pub fn start_places(&self) -> impl Iterator<Item = &Arc<Place>> {
        self.places
            .iter()
            .filter(|p| p.classification().contains(NodeClassification::START))
    }

    /// Call `initialize` on every transition, handing each a weak reference
    /// to itself.
    pub fn initialize_transitions(&self) -> Result<()> {
        for transition in &self.transitions {
            let ctx = TransitionContext::new(
                &self.places,
                Arc::clone(&self.tracker),
                Arc::downgrade(transition),
            );
            transition.initialize(&ctx)?;
        }
        Ok(())
    }

    pub fn any_executing(&self) -> bool {
        self.transitions.iter().any(|t| t.executing())
    }
}
