use crate::config::ExecutorConfig;
use crate::error::{BackendError, DataAccessError, StoreError, normalize};
use crate::handle::AsyncHandle;
use crate::handle::blocking::BlockingHandle;
use crate::operation::{WriteAdapter, WriteOperation};
use crate::types::{Filter, OperationResult, Row, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

pub(crate) struct OwnedRuntime {
    runtime: Option<Runtime>,
    shutdown_timeout: Duration,
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        // Blocking shutdown is not allowed from inside another runtime.
        if Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(self.shutdown_timeout);
        }
    }
}

/// Work-scheduling facility: runs synchronous backend calls on a blocking
/// pool and reports their outcome through an [`AsyncHandle`].
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

impl Scheduler {
    /// Builds a dedicated multi-thread runtime from `config`.
    pub fn new(config: &ExecutorConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| StoreError::InvalidConfig {
                message: format!("failed to start runtime: {e}"),
            })?;
        let handle = runtime.handle().clone();
        Ok(Self {
            handle,
            owned: Some(Arc::new(OwnedRuntime {
                runtime: Some(runtime),
                shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            })),
        })
    }

    /// Schedules onto a caller-supplied runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Schedules onto the runtime the caller is running in.
    pub fn current() -> Result<Self, StoreError> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|_| StoreError::InvalidArgument("no tokio runtime is running".into()))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `work` once on the blocking pool. A failure is normalized into a
    /// data access failure; a panic is reported the same way.
    pub fn submit<T, F>(&self, work: F) -> AsyncHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    {
        let (completer, handle) = AsyncHandle::pending();
        let task = self.handle.spawn_blocking(move || {
            if completer.is_cancelled() {
                debug!("skipping work cancelled before it started");
                return;
            }
            let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => result.map_err(normalize),
                Err(_) => {
                    warn!("backend call panicked");
                    Err(DataAccessError::new("backend call panicked"))
                }
            };
            completer.complete(outcome);
        });
        handle.with_abort(task.abort_handle())
    }

    pub fn to_blocking<T: Clone + Send + 'static>(
        &self,
        source: AsyncHandle<T>,
    ) -> Result<BlockingHandle<T>, StoreError> {
        // The handle keeps an owned runtime alive so its forwarder can finish.
        Ok(BlockingHandle::new(&self.handle, source)?.retaining(self.owned.clone()))
    }
}

/// Exposes a synchronous [`WriteAdapter`] as asynchronous insert, update and
/// delete operations.
pub struct AsyncExecutor<W: ?Sized> {
    writer: Arc<W>,
    scheduler: Scheduler,
}

impl<W: WriteAdapter + ?Sized + 'static> AsyncExecutor<W> {
    pub fn new(writer: Arc<W>, scheduler: Scheduler) -> Self {
        Self { writer, scheduler }
    }

    pub fn with_config(writer: Arc<W>, config: &ExecutorConfig) -> Result<Self, StoreError> {
        Ok(Self::new(writer, Scheduler::new(config)?))
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Schedules exactly one backend write. No retries happen here.
    pub fn execute(&self, op: WriteOperation) -> AsyncHandle<OperationResult> {
        debug!(target_name = %op.target, kind = op.kind_name(), "scheduling write");
        let writer = Arc::clone(&self.writer);
        self.scheduler.submit(move || writer.execute_write(&op))
    }

    pub fn insert(&self, target: impl Into<String>, rows: Vec<Row>) -> AsyncHandle<OperationResult> {
        self.execute(WriteOperation::insert(target, rows))
    }

    pub fn update(
        &self,
        target: impl Into<String>,
        assignments: Vec<(String, Value)>,
        filter: Option<Filter>,
    ) -> AsyncHandle<OperationResult> {
        self.execute(WriteOperation::update(target, assignments, filter))
    }

    pub fn delete(
        &self,
        target: impl Into<String>,
        filter: Option<Filter>,
    ) -> AsyncHandle<OperationResult> {
        self.execute(WriteOperation::delete(target, filter))
    }

    pub fn to_blocking(
        &self,
        source: AsyncHandle<OperationResult>,
    ) -> Result<BlockingHandle<OperationResult>, StoreError> {
        self.scheduler.to_blocking(source)
    }

    /// Executes `op` and blocks the calling thread for the result.
    pub fn execute_blocking(&self, op: WriteOperation) -> Result<OperationResult, StoreError> {
        self.to_blocking(self.execute(op))?.get()
    }

    pub fn execute_blocking_timeout(
        &self,
        op: WriteOperation,
        timeout: Duration,
    ) -> Result<OperationResult, StoreError> {
        self.to_blocking(self.execute(op))?.get_timeout(timeout)
    }
}
