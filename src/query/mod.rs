pub mod adapter;
pub mod config;
pub mod lock;

pub use adapter::{LockQueryAdapter, QueryAdapter, RowStream};
pub use config::{LOCK_MODE, LOCK_TIMEOUT, LockMode, Param, Projection, QueryConfig};
pub use lock::{LockQuery, ResultStream};
