use super::config::QueryConfig;
use crate::error::BackendError;
use crate::types::Row;

/// Lazy, single-pass sequence of rows produced by a backend.
pub type RowStream = Box<dyn Iterator<Item = Result<Row, BackendError>> + Send>;

/// Backend collaborator that executes a fully resolved query.
///
/// Implementations are invoked concurrently with independent configurations.
/// The async flavor is obtained by running these calls through
/// [`crate::executor::Scheduler::submit`], not by a second trait.
pub trait QueryAdapter: Send + Sync {
    fn stream(&self, query: &QueryConfig) -> Result<RowStream, BackendError>;
}

/// Query adapter that can also attempt row locks.
pub trait LockQueryAdapter: QueryAdapter {
    /// Attempts to acquire the lock described by the `LOCK_MODE` and
    /// `LOCK_TIMEOUT` parameters of `query`. `Ok(false)` means the lock is
    /// held elsewhere; that is an outcome, not a failure.
    fn try_lock(&self, query: &QueryConfig) -> Result<bool, BackendError>;
}
