use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Counts transition bodies currently in flight across a workplan instance.
///
/// Transitions enter before consuming tokens and exit once their outputs are
/// placed; a pausing engine waits here instead of spinning on every
/// transition's `executing` flag.
#[derive(Default)]
pub struct ExecutionTracker {
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        *self.in_flight.lock() += 1;
    }

    pub fn exit(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Block until nothing is in flight and `busy` reports false.
    ///
    /// `busy` covers transitions that track execution on their own; it is
    /// re-checked at least every `poll`. There is no upper bound on the wait.
    pub fn wait_idle(&self, poll: Duration, busy: impl Fn() -> bool) {
        let mut in_flight = self.in_flight.lock();
        loop {
            if *in_flight == 0 {
                drop(in_flight);
                if !busy() {
                    return;
                }
                in_flight = self.in_flight.lock();
            }
            self.idle.wait_for(&mut in_flight, poll);
        }
    }
}
