use super::cell::{CompletionCell, Outcome};
use super::{AsyncHandle, CancelHandle};
use crate::error::{DataAccessError, StoreError};
use crate::executor::OwnedRuntime;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::{self, AbortHandle};
use tracing::warn;

/// Blocking view over an [`AsyncHandle`].
///
/// A forwarding task on the supplied runtime awaits the source exactly once
/// and writes its outcome into a private [`CompletionCell`]; every `get`
/// reads that cell.
pub struct BlockingHandle<T> {
    cell: Arc<CompletionCell<T>>,
    source: CancelHandle,
    forwarder: AbortHandle,
    _runtime: Option<Arc<OwnedRuntime>>,
}

/// Fails the cell if the forwarding task is dropped before it writes, which
/// happens when its runtime shuts down first.
struct ForwardGuard<T: Clone> {
    cell: Arc<CompletionCell<T>>,
}

impl<T: Clone> Drop for ForwardGuard<T> {
    fn drop(&mut self) {
        if self.cell.is_done() {
            return;
        }
        let cause = DataAccessError::new("runtime shut down before the operation completed");
        if self.cell.complete(Outcome::Failed(Arc::new(cause))) {
            warn!("forwarding task dropped before the outcome arrived");
        }
    }
}

/// Wakes threads blocked in [`BlockingHandle::get`] or
/// [`BlockingHandle::get_timeout`] with [`StoreError::Interrupted`].
#[derive(Clone)]
pub struct Interrupter<T> {
    cell: Arc<CompletionCell<T>>,
}

impl<T: Clone> Interrupter<T> {
    pub fn interrupt(&self) {
        self.cell.interrupt();
    }
}

impl<T: Clone + Send + 'static> BlockingHandle<T> {
    pub fn new(rt: &Handle, source: AsyncHandle<T>) -> Result<Self, StoreError> {
        if let Ok(current) = Handle::try_current() {
            if current.runtime_flavor() == RuntimeFlavor::CurrentThread {
                return Err(StoreError::InvalidArgument(
                    "blocking handles cannot be created on a current-thread runtime".into(),
                ));
            }
        }
        let cell = Arc::new(CompletionCell::new());
        let cancel = source.cancel_handle();
        let guard = ForwardGuard {
            cell: Arc::clone(&cell),
        };
        let forwarder = rt.spawn(async move {
            let outcome = match source.await {
                Ok(value) => Outcome::Value(value),
                Err(StoreError::Cancelled) => Outcome::Cancelled,
                Err(StoreError::Execution(cause)) => Outcome::Failed(cause),
                Err(StoreError::DataAccess(err)) => Outcome::Failed(Arc::new(err)),
                Err(other) => Outcome::Failed(Arc::new(DataAccessError::wrap(Box::new(other)))),
            };
            guard.cell.complete(outcome);
        });
        Ok(Self {
            cell,
            source: cancel,
            forwarder: forwarder.abort_handle(),
            _runtime: None,
        })
    }

    /// Keeps `runtime` alive for as long as this handle exists.
    pub(crate) fn retaining(mut self, runtime: Option<Arc<OwnedRuntime>>) -> Self {
        self._runtime = runtime;
        self
    }

    /// Attempts to cancel the underlying computation. Returns `false` when
    /// the computation already finished or was cancelled before.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        if self.cell.is_done() {
            return false;
        }
        if !self.source.cancel(may_interrupt) {
            return false;
        }
        self.cell.complete(Outcome::Cancelled);
        self.forwarder.abort();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    /// `true` once the source has finished, even if its outcome has not been
    /// forwarded yet.
    pub fn is_done(&self) -> bool {
        self.cell.is_done() || self.source.is_done()
    }

    /// Waits without bound for the outcome.
    pub fn get(&self) -> Result<T, StoreError> {
        self.wait(None)
    }

    /// Waits at most `timeout`. Timing out never cancels the computation.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, StoreError> {
        self.wait(Some(timeout))
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<T, StoreError> {
        match Handle::try_current() {
            // Hand this worker's queued tasks, the forwarder included, to
            // another thread before parking it.
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                task::block_in_place(|| self.cell.wait(timeout))
            }
            Ok(_) => Err(StoreError::InvalidArgument(
                "blocking handles cannot be awaited on a current-thread runtime".into(),
            )),
            Err(_) => self.cell.wait(timeout),
        }
    }

    pub fn interrupter(&self) -> Interrupter<T> {
        Interrupter {
            cell: Arc::clone(&self.cell),
        }
    }
}

pub fn to_blocking<T: Clone + Send + 'static>(
    rt: &Handle,
    source: AsyncHandle<T>,
) -> Result<BlockingHandle<T>, StoreError> {
    BlockingHandle::new(rt, source)
}

pub fn await_blocking<T: Clone + Send + 'static>(
    rt: &Handle,
    source: AsyncHandle<T>,
) -> Result<T, StoreError> {
    to_blocking(rt, source)?.get()
}

pub fn await_blocking_timeout<T: Clone + Send + 'static>(
    rt: &Handle,
    source: AsyncHandle<T>,
    timeout: Duration,
) -> Result<T, StoreError> {
    to_blocking(rt, source)?.get_timeout(timeout)
}
