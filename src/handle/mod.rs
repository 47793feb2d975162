pub mod blocking;
pub mod cell;

use crate::error::{DataAccessError, StoreError};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    Pending,
    Completed,
    Cancelled,
}

struct Slot<T> {
    status: SlotStatus,
    tx: Option<oneshot::Sender<Result<T, DataAccessError>>>,
}

/// Shared transition guard for one handle: Pending moves to Completed or
/// Cancelled exactly once.
trait Transition: Send + Sync {
    fn cancel(&self) -> bool;
    fn status(&self) -> SlotStatus;
}

impl<T: Send> Transition for Mutex<Slot<T>> {
    fn cancel(&self) -> bool {
        let mut slot = self.lock();
        if slot.status != SlotStatus::Pending {
            return false;
        }
        slot.status = SlotStatus::Cancelled;
        // Dropping the sender wakes any task awaiting the handle.
        slot.tx.take();
        true
    }

    fn status(&self) -> SlotStatus {
        self.lock().status
    }
}

/// Cancels the computation behind an [`AsyncHandle`] without owning it.
#[derive(Clone)]
pub struct CancelHandle {
    slot: Arc<dyn Transition>,
    abort: Option<AbortHandle>,
}

impl CancelHandle {
    /// Returns `true` only if this call moved the handle out of pending.
    /// With `may_interrupt`, the scheduled task is also aborted if it has
    /// not started running yet.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let cancelled = self.slot.cancel();
        if cancelled && may_interrupt {
            if let Some(abort) = &self.abort {
                abort.abort();
            }
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.status() == SlotStatus::Cancelled
    }

    pub fn is_done(&self) -> bool {
        self.slot.status() != SlotStatus::Pending
    }
}

/// Producer side of an [`AsyncHandle`]. Consumed by the single completion.
pub struct Completer<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Completer<T> {
    /// Publishes the outcome. Returns `false` when the handle was already
    /// cancelled, in which case the outcome is dropped.
    pub fn complete(self, outcome: Result<T, DataAccessError>) -> bool {
        let mut slot = self.slot.lock();
        if slot.status != SlotStatus::Pending {
            return false;
        }
        slot.status = SlotStatus::Completed;
        if let Some(tx) = slot.tx.take() {
            // The receiver may be gone if the handle was dropped; the outcome
            // has nobody to observe it then.
            let _ = tx.send(outcome);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().status == SlotStatus::Cancelled
    }
}

/// Asynchronous completion handle for a value produced elsewhere.
///
/// Awaiting yields the value, [`StoreError::Execution`] with the producer's
/// failure, or [`StoreError::Cancelled`].
pub struct AsyncHandle<T> {
    rx: oneshot::Receiver<Result<T, DataAccessError>>,
    slot: Arc<Mutex<Slot<T>>>,
    abort: Option<AbortHandle>,
}

impl<T: Send + 'static> AsyncHandle<T> {
    pub fn pending() -> (Completer<T>, AsyncHandle<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Slot {
            status: SlotStatus::Pending,
            tx: Some(tx),
        }));
        (
            Completer {
                slot: Arc::clone(&slot),
            },
            AsyncHandle {
                rx,
                slot,
                abort: None,
            },
        )
    }

    pub fn ready(value: T) -> Self {
        let (completer, handle) = Self::pending();
        completer.complete(Ok(value));
        handle
    }

    pub fn failed(err: DataAccessError) -> Self {
        let (completer, handle) = Self::pending();
        completer.complete(Err(err));
        handle
    }

    /// Ties the handle to the task computing it, so interrupting
    /// cancellation can abort that task.
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: self.slot.clone(),
            abort: self.abort.clone(),
        }
    }

    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.cancel_handle().cancel(may_interrupt)
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().status == SlotStatus::Cancelled
    }

    pub fn is_done(&self) -> bool {
        self.slot.lock().status != SlotStatus::Pending
    }
}

impl<T> Future for AsyncHandle<T> {
    type Output = Result<T, StoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(StoreError::Execution(Arc::new(err)))),
            Poll::Ready(Err(_)) => {
                if self.slot.lock().status == SlotStatus::Cancelled {
                    Poll::Ready(Err(StoreError::Cancelled))
                } else {
                    tracing::warn!("async producer dropped without completing");
                    Poll::Ready(Err(StoreError::Execution(Arc::new(DataAccessError::new(
                        "operation terminated without producing a result",
                    )))))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AsyncHandle;
    use crate::error::{DataAccessError, StoreError};

    #[tokio::test]
    async fn ready_handle_resolves_to_value() {
        let handle = AsyncHandle::ready(7u64);
        assert!(handle.is_done());
        assert!(!handle.cancel(true));
        assert_eq!(handle.await.expect("value"), 7);
    }

    #[tokio::test]
    async fn failed_handle_resolves_to_execution_failure() {
        let handle = AsyncHandle::<u64>::failed(DataAccessError::new("disk full"));
        match handle.await {
            Err(StoreError::Execution(cause)) => assert_eq!(cause.message(), "disk full"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_before_completion_wins_and_drops_late_value() {
        let (completer, handle) = AsyncHandle::<u64>::pending();
        assert!(handle.cancel(false));
        assert!(handle.is_cancelled());
        assert!(completer.is_cancelled());
        assert!(!completer.complete(Ok(1)));
        assert!(matches!(handle.await, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn dropped_producer_surfaces_execution_failure() {
        let (completer, handle) = AsyncHandle::<u64>::pending();
        drop(completer);
        assert!(matches!(handle.await, Err(StoreError::Execution(_))));
    }
}
