use super::adapter::{LockQueryAdapter, RowStream};
use super::config::{LOCK_MODE, LOCK_TIMEOUT, LockMode, Param, Projection, QueryConfig};
use crate::error::{StoreError, normalize};
use crate::executor::Scheduler;
use crate::handle::AsyncHandle;
use crate::types::{Row, TryFromRow};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Query builder that can request row locks.
///
/// Every builder call returns a new `LockQuery`; the receiver keeps its
/// configuration. Requesting a lock only records parameters: nothing is
/// acquired until [`LockQuery::try_lock`] runs, and [`LockQuery::stream`]
/// never takes locks on its own.
pub struct LockQuery<A: ?Sized> {
    adapter: Arc<A>,
    config: QueryConfig,
}

impl<A: ?Sized> Clone for LockQuery<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
        }
    }
}

impl<A: LockQueryAdapter + ?Sized> LockQuery<A> {
    pub fn new(adapter: Arc<A>, config: QueryConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Replaces the configuration, keeping the adapter.
    pub fn with_config(&self, config: QueryConfig) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            config,
        }
    }

    /// Requests `mode`, waiting at most `timeout_ms` milliseconds when the
    /// lock is attempted. A negative timeout means no timeout and removes any
    /// timeout set by an earlier call.
    pub fn lock(&self, mode: LockMode, timeout_ms: i64) -> Result<Self, StoreError> {
        let timeout = u64::try_from(timeout_ms).ok().map(Duration::from_millis);
        self.lock_for(mode, timeout)
    }

    pub fn lock_for(&self, mode: LockMode, timeout: Option<Duration>) -> Result<Self, StoreError> {
        mode.validate()?;
        debug!(target_name = self.config.target(), mode = %mode, ?timeout, "lock requested");
        let config = self.config.with_parameter(LOCK_MODE, Param::LockMode(mode));
        let config = match timeout {
            Some(timeout) => config.with_parameter(
                LOCK_TIMEOUT,
                Param::Millis(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
            ),
            None => config.without_parameter(LOCK_TIMEOUT),
        };
        Ok(self.with_config(config))
    }

    /// The lock mode and timeout currently recorded, if any.
    pub fn lock_request(&self) -> Option<(LockMode, Option<u64>)> {
        let mode = self.config.lock_mode()?.clone();
        let timeout = match self.config.parameter(LOCK_TIMEOUT) {
            Some(Param::Millis(ms)) => Some(*ms),
            _ => None,
        };
        Some((mode, timeout))
    }

    /// Records the lock request and immediately attempts it against the
    /// resulting configuration. `Ok(false)` means the lock is unavailable.
    pub fn try_lock(&self, mode: LockMode, timeout_ms: i64) -> Result<bool, StoreError> {
        let locked = self.lock(mode, timeout_ms)?;
        let acquired = locked
            .adapter
            .try_lock(&locked.config)
            .map_err(|e| StoreError::DataAccess(normalize(e)))?;
        debug!(target_name = locked.config.target(), acquired, "lock attempt finished");
        Ok(acquired)
    }

    /// Streams rows for the current configuration with `projection` applied.
    pub fn stream(&self, projection: Projection) -> Result<ResultStream<Row>, StoreError> {
        let config = self.config.with_projection(projection);
        let rows = self
            .adapter
            .stream(&config)
            .map_err(|e| StoreError::DataAccess(normalize(e)))?;
        Ok(ResultStream::new(rows))
    }

    /// Like [`LockQuery::stream`], decoding each row into `T`.
    pub fn stream_as<T: TryFromRow>(
        &self,
        projection: Projection,
    ) -> Result<ResultStream<T>, StoreError> {
        let config = self.config.with_projection(projection);
        let rows = self
            .adapter
            .stream(&config)
            .map_err(|e| StoreError::DataAccess(normalize(e)))?;
        Ok(ResultStream::new(rows))
    }

    pub fn fetch(&self, projection: Projection) -> Result<Vec<Row>, StoreError> {
        self.stream(projection)?.collect()
    }
}

impl<A: LockQueryAdapter + ?Sized + 'static> LockQuery<A> {
    /// Runs [`LockQuery::fetch`] on `scheduler` and returns immediately.
    pub fn stream_async(&self, scheduler: &Scheduler, projection: Projection) -> AsyncHandle<Vec<Row>> {
        let query = self.clone();
        scheduler.submit(move || query.fetch(projection).map_err(Into::into))
    }
}

/// Rows from an adapter, with failures normalized and each row decoded as `T`.
pub struct ResultStream<T> {
    rows: RowStream,
    _decode: PhantomData<fn() -> T>,
}

impl<T> ResultStream<T> {
    fn new(rows: RowStream) -> Self {
        Self {
            rows,
            _decode: PhantomData,
        }
    }
}

impl<T: TryFromRow> Iterator for ResultStream<T> {
    type Item = Result<T, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(StoreError::DataAccess(normalize(e)))),
        };
        Some(T::try_from_row(row).map_err(StoreError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::LockQuery;
    use crate::error::BackendError;
    use crate::query::adapter::{LockQueryAdapter, QueryAdapter, RowStream};
    use crate::query::config::{LOCK_TIMEOUT, LockMode, QueryConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<QueryConfig>>,
    }

    impl QueryAdapter for Recording {
        fn stream(&self, query: &QueryConfig) -> Result<RowStream, BackendError> {
            self.seen.lock().push(query.clone());
            Ok(Box::new(std::iter::empty()))
        }
    }

    impl LockQueryAdapter for Recording {
        fn try_lock(&self, query: &QueryConfig) -> Result<bool, BackendError> {
            self.seen.lock().push(query.clone());
            Ok(true)
        }
    }

    #[test]
    fn try_lock_passes_the_fresh_parameters_to_the_adapter() {
        let adapter = Arc::new(Recording::default());
        let query = LockQuery::new(Arc::clone(&adapter), QueryConfig::new("orders"));
        assert!(query.try_lock(LockMode::PessimisticRead, 250).expect("lock"));

        let seen = adapter.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].lock_mode(), Some(&LockMode::PessimisticRead));
        assert_eq!(seen[0].lock_timeout().map(|d| d.as_millis()), Some(250));
        // The receiver keeps its lock-free configuration.
        assert!(query.config().lock_mode().is_none());
    }

    #[test]
    fn negative_timeout_clears_an_earlier_timeout() {
        let adapter = Arc::new(Recording::default());
        let query = LockQuery::new(adapter, QueryConfig::new("orders"))
            .lock(LockMode::PessimisticWrite, 500)
            .expect("lock")
            .lock(LockMode::PessimisticWrite, -1)
            .expect("lock");
        assert!(query.config().parameter(LOCK_TIMEOUT).is_none());
        assert_eq!(query.lock_request(), Some((LockMode::PessimisticWrite, None)));
    }
}
