use crate::{HolderId, NodeClassification, Result, SubscriptionId, Token};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Receives "token added" signals from a place.
pub trait PlaceListener: Send + Sync {
    fn token_added(&self, place: &Arc<Place>, token: &Token) -> Result<()>;
}

/// Node holding tokens.
///
/// Arrivals are announced in insertion order. A token added while another
/// arrival is being announced (from a listener, or from another thread) is
/// queued and announced by whichever call is already delivering, so a place
/// never reports two arrivals concurrently or out of order.
pub struct Place {
    id: HolderId,
    name: String,
    classification: NodeClassification,
    state: Mutex<PlaceState>,
    listeners: RwLock<Vec<(SubscriptionId, Weak<dyn PlaceListener>)>>,
    next_subscription: AtomicU64,
}

#[derive(Default)]
struct PlaceState {
    tokens: Vec<Token>,
    pending: VecDeque<Token>,
    delivering: bool,
    paused: bool,
}

impl Place {
    pub fn new(id: HolderId, name: impl Into<String>, classification: NodeClassification) -> Self {
        Self {
            id,
            name: name.into(),
            classification,
            state: Mutex::new(PlaceState::default()),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> HolderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classification(&self) -> NodeClassification {
        self.classification
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.state.lock().tokens.clone()
    }

    pub fn has_tokens(&self) -> bool {
        !self.state.lock().tokens.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Insert a token and announce it to every listener.
    pub fn add(self: &Arc<Self>, token: Token) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.tokens.push(token.clone());
            tracing::debug!("Token {} added to place {} ({})", token, self.id, self.name);
            if state.paused {
                return Ok(());
            }
            state.pending.push_back(token);
            if state.delivering {
                return Ok(());
            }
            state.delivering = true;
        }
        self.deliver_pending()
    }

    /// Delete one occurrence of `token`. Returns whether it was present.
    pub fn remove(&self, token: &Token) -> bool {
        let mut state = self.state.lock();
        match state.tokens.iter().position(|t| t == token) {
            Some(index) => {
                state.tokens.remove(index);
                true
            }
            None => false,
        }
    }

    /// Hand the oldest token to a consuming transition. A paused place keeps
    /// its tokens.
    pub fn take(&self) -> Option<Token> {
        let mut state = self.state.lock();
        if state.paused || state.tokens.is_empty() {
            return None;
        }
        Some(state.tokens.remove(0))
    }

    /// Return a token obtained through [`Place::take`] without announcing it.
    pub fn put_back(&self, token: Token) {
        self.state.lock().tokens.insert(0, token);
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        state.paused = true;
        state.pending.clear();
    }

    /// Lift the pause and re-announce every token currently held.
    pub fn resume(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.paused = false;
            state.pending = state.tokens.iter().cloned().collect();
            if state.delivering || state.pending.is_empty() {
                return Ok(());
            }
            state.delivering = true;
        }
        self.deliver_pending()
    }

    /// Replace the token set without announcing anything.
    pub fn restore(&self, tokens: Vec<Token>) {
        let mut state = self.state.lock();
        state.tokens = tokens;
        state.pending.clear();
    }

    pub fn subscribe(&self, listener: Weak<dyn PlaceListener>) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription);
        listeners.len() != before
    }

    fn deliver_pending(self: &Arc<Self>) -> Result<()> {
        loop {
            let token = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(token) if !state.paused => token,
                    _ => {
                        state.pending.clear();
                        state.delivering = false;
                        return Ok(());
                    }
                }
            };

            if let Err(e) = self.notify(&token) {
                // Queued arrivals stay stored and are announced again on resume.
                let mut state = self.state.lock();
                state.pending.clear();
                state.delivering = false;
                return Err(e);
            }
        }
    }

    fn notify(self: &Arc<Self>, token: &Token) -> Result<()> {
        let listeners: Vec<Arc<dyn PlaceListener>> = self
            .listeners
            .read()
            .iter()
            .filter_map(|(_, listener)| listener.upgrade())
            .collect();

        for listener in listeners {
            listener.token_added(self, token)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Place")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("classification", &self.classification)
            .field("tokens", &self.tokens())
            .finish()
    }
}
