use parking_lot::Mutex;
use plancore::{
    FlowError, Place, Result, SnapshotError, Token, Transition, TransitionCore, TransitionError,
    TransitionTemplate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress of one token inside a [`TaskTransition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum TaskStatus {
    /// Waiting to be handed to a handler.
    Pending,
    /// A handler owns the work.
    Running,
    /// Work finished while paused; the token leaves through `result` on resume.
    Completed { result: usize },
    Faulted { reason: String },
}

struct TaskEntry {
    token: Token,
    status: TaskStatus,
}

#[derive(Default)]
struct TaskStorage {
    entries: Vec<TaskEntry>,
    paused: bool,
}

/// Work step executed outside the engine.
///
/// An arriving token is stored, the transition becomes executing and raises
/// "triggered". Whoever handles the trigger (usually a handler registered for
/// `TaskTransition<P>` in a transition mapper) does the work and reports the
/// chosen output through [`TaskTransition::complete`]. The parameter type `P`
/// tells tasks apart for dispatch.
pub struct TaskTransition<P> {
    core: TransitionCore,
    parameters: P,
    storage: Mutex<TaskStorage>,
}

impl<P: Send + Sync + 'static> TaskTransition<P> {
    pub fn new(template: TransitionTemplate, parameters: P) -> Self {
        Self {
            core: TransitionCore::new(template).observable(true),
            parameters,
            storage: Mutex::new(TaskStorage::default()),
        }
    }

    pub fn parameters(&self) -> &P {
        &self.parameters
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.storage
            .lock()
            .entries
            .iter()
            .map(|e| e.status.clone())
            .collect()
    }

    /// Finish the oldest running work item and send its token to output
    /// `result`.
    pub fn complete(&self, result: usize) -> Result<()> {
        let output = Arc::clone(self.core.output(result)?);

        let token = {
            let mut storage = self.storage.lock();
            let index = storage
                .entries
                .iter()
                .position(|e| e.status == TaskStatus::Running)
                .ok_or(TransitionError::NotExecuting(self.core.id()))?;

            if storage.paused {
                storage.entries[index].status = TaskStatus::Completed { result };
                None
            } else {
                Some(storage.entries.remove(index).token)
            }
        };

        let Some(token) = token else {
            tracing::debug!(
                "Task {} completed while paused, holding result {}",
                self.core.name(),
                result
            );
            self.core.exit_executing();
            return Ok(());
        };

        tracing::debug!(
            "Task {} completed with result {}, token {} moves to place {}",
            self.core.name(),
            result,
            token,
            output.id()
        );
        let placed = output.add(token);
        self.core.exit_executing();
        placed
    }

    /// Hand every pending or faulted token to the trigger listeners again.
    fn dispatch_pending(&self) -> Result<()> {
        let count = {
            let mut storage = self.storage.lock();
            let mut count = 0;
            for entry in storage.entries.iter_mut() {
                if matches!(entry.status, TaskStatus::Pending | TaskStatus::Faulted { .. }) {
                    entry.status = TaskStatus::Running;
                    count += 1;
                }
            }
            count
        };

        for _ in 0..count {
            self.core.enter_executing()?;
            self.raise()?;
        }
        Ok(())
    }

    /// One status per token; a missing state means all work is pending.
    fn restored_statuses(
        &self,
        tokens: usize,
        state: &serde_json::Value,
    ) -> Result<Vec<TaskStatus>> {
        let statuses: Vec<TaskStatus> = if state.is_null() {
            vec![TaskStatus::Pending; tokens]
        } else {
            Vec::<TaskStatus>::deserialize(state)?
        };
        if statuses.len() != tokens {
            return Err(SnapshotError::InvalidState {
                holder: self.core.id(),
                reason: format!("{} token(s) but {} status(es)", tokens, statuses.len()),
            }
            .into());
        }
        Ok(statuses)
    }

    fn raise(&self) -> Result<()> {
        if let Err(e) = self.core.raise_triggered() {
            self.fault(&e);
            return Err(e);
        }
        Ok(())
    }
}

impl<P: Send + Sync + 'static> Transition for TaskTransition<P> {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token_added(&self, _place: &Arc<Place>, _token: &Token) -> Result<()> {
        self.core.enter_executing()?;
        let tokens = match self.core.take_inputs() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                self.core.exit_executing();
                return Ok(());
            }
            Err(e) => {
                self.core.exit_executing();
                return Err(e.into());
            }
        };

        {
            let mut storage = self.storage.lock();
            for token in &tokens {
                storage.entries.push(TaskEntry {
                    token: token.clone(),
                    status: TaskStatus::Running,
                });
            }
        }
        self.core.release(&tokens);

        // One executing mark per stored token; the first was taken above.
        for _ in 1..tokens.len() {
            self.core.enter_executing()?;
        }
        for _ in 0..tokens.len() {
            self.raise()?;
        }
        Ok(())
    }

    fn tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .storage
            .lock()
            .entries
            .iter()
            .map(|e| e.token.clone())
            .collect();
        tokens.extend(self.core.in_flight_tokens());
        tokens
    }

    fn state(&self) -> serde_json::Value {
        serde_json::to_value(self.statuses()).unwrap_or_default()
    }

    fn check_restore(&self, tokens: &[Token], state: &serde_json::Value) -> Result<()> {
        self.restored_statuses(tokens.len(), state).map(|_| ())
    }

    fn restore(&self, tokens: Vec<Token>, state: serde_json::Value) -> Result<()> {
        let statuses = self.restored_statuses(tokens.len(), &state)?;
        let entries = tokens
            .into_iter()
            .zip(statuses)
            .map(|(token, status)| TaskEntry {
                token,
                // Work that was running when the snapshot was taken runs again.
                status: match status {
                    TaskStatus::Running => TaskStatus::Pending,
                    other => other,
                },
            })
            .collect();
        self.storage.lock().entries = entries;
        Ok(())
    }

    fn pause(&self) {
        self.storage.lock().paused = true;
    }

    fn resume(&self) -> Result<()> {
        let finished: Vec<(Token, usize)> = {
            let mut storage = self.storage.lock();
            storage.paused = false;
            let mut finished = Vec::new();
            storage.entries.retain(|entry| match entry.status {
                TaskStatus::Completed { result } => {
                    finished.push((entry.token.clone(), result));
                    false
                }
                _ => true,
            });
            finished
        };

        for (token, result) in finished {
            self.core.output(result)?.add(token)?;
        }
        self.dispatch_pending()
    }

    fn fault(&self, error: &FlowError) {
        let faulted = {
            let mut storage = self.storage.lock();
            match storage
                .entries
                .iter_mut()
                .find(|e| e.status == TaskStatus::Running)
            {
                Some(entry) => {
                    entry.status = TaskStatus::Faulted {
                        reason: error.to_string(),
                    };
                    true
                }
                None => false,
            }
        };
        if faulted {
            tracing::error!("Task {} faulted: {}", self.core.name(), error);
            self.core.exit_executing();
        }
    }
}
