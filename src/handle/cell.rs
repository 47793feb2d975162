use crate::error::{DataAccessError, StoreError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Terminal state of a computation as observed by blocking readers.
#[derive(Debug)]
pub enum Outcome<T> {
    Value(T),
    Failed(Arc<DataAccessError>),
    Cancelled,
}

impl<T: Clone> Outcome<T> {
    fn observe(&self) -> Result<T, StoreError> {
        match self {
            Outcome::Value(value) => Ok(value.clone()),
            Outcome::Failed(cause) => Err(StoreError::Execution(Arc::clone(cause))),
            Outcome::Cancelled => Err(StoreError::Cancelled),
        }
    }
}

struct CellState<T> {
    outcome: Option<Outcome<T>>,
    /// Bumped by every interrupt; a waiter that sees it move gives up.
    interrupt_epoch: u64,
}

/// Single-write completion cell. The first write wins; later writes are
/// ignored, and every reader observes the same terminal outcome.
pub struct CompletionCell<T> {
    state: Mutex<CellState<T>>,
    ready: Condvar,
}

impl<T> Default for CompletionCell<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CellState {
                outcome: None,
                interrupt_epoch: 0,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<T: Clone> CompletionCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call wrote the outcome.
    pub fn complete(&self, outcome: Outcome<T>) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome);
        drop(state);
        self.ready.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.state.lock().outcome, Some(Outcome::Cancelled))
    }

    /// Non-blocking read of the outcome, if any.
    pub fn peek(&self) -> Option<Result<T, StoreError>> {
        self.state.lock().outcome.as_ref().map(Outcome::observe)
    }

    /// Wakes every current waiter with [`StoreError::Interrupted`].
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupt_epoch = state.interrupt_epoch.wrapping_add(1);
        drop(state);
        self.ready.notify_all();
    }

    /// Blocks until an outcome is written, the optional timeout elapses, or
    /// the wait is interrupted. Timing out leaves the cell untouched.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<T, StoreError> {
        let started = Instant::now();
        let deadline = timeout.and_then(|t| started.checked_add(t));
        let mut state = self.state.lock();
        let epoch = state.interrupt_epoch;
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.observe();
            }
            if state.interrupt_epoch != epoch {
                return Err(StoreError::Interrupted);
            }
            match deadline {
                None => self.ready.wait(&mut state),
                Some(deadline) => {
                    if Instant::now() >= deadline
                        || self.ready.wait_until(&mut state, deadline).timed_out()
                    {
                        if let Some(outcome) = &state.outcome {
                            return outcome.observe();
                        }
                        return Err(StoreError::Timeout {
                            waited_ms: u64::try_from(started.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                        });
                    }
                }
            }
        }
    }
}
