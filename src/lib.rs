pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod memory;
pub mod operation;
pub mod query;
pub mod types;

pub use crate::config::ExecutorConfig;
pub use crate::error::{BackendError, DataAccessError, StoreError, StoreErrorCode, normalize};
pub use crate::executor::{AsyncExecutor, Scheduler};
pub use crate::handle::blocking::{
    BlockingHandle, Interrupter, await_blocking, await_blocking_timeout, to_blocking,
};
pub use crate::handle::{AsyncHandle, CancelHandle, Completer};
pub use crate::memory::MemoryStore;
pub use crate::operation::{WriteAdapter, WriteKind, WriteOperation};
pub use crate::query::{
    LOCK_MODE, LOCK_TIMEOUT, LockMode, LockQuery, LockQueryAdapter, Param, Projection,
    QueryAdapter, QueryConfig, ResultStream, RowStream,
};
pub use crate::types::{Filter, OperationResult, Row, RowDecodeError, TryFromRow, Value};
