use crate::types::RowDecodeError;
use std::sync::Arc;
use thiserror::Error;

/// Error type raised by backend adapters. Anything that is not already a
/// [`DataAccessError`] is wrapped by [`normalize`] before reaching callers.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    InvalidArgument,
    InvalidConfig,
    DataAccess,
    Cancelled,
    Execution,
    Timeout,
    Interrupted,
    Decode,
}

impl StoreErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreErrorCode::InvalidArgument => "invalid_argument",
            StoreErrorCode::InvalidConfig => "invalid_config",
            StoreErrorCode::DataAccess => "data_access",
            StoreErrorCode::Cancelled => "cancelled",
            StoreErrorCode::Execution => "execution",
            StoreErrorCode::Timeout => "timeout",
            StoreErrorCode::Interrupted => "interrupted",
            StoreErrorCode::Decode => "decode",
        }
    }
}

/// A backend execution failure, optionally carrying the error the adapter
/// originally raised.
#[derive(Debug, Error)]
#[error("data access failure: {message}")]
pub struct DataAccessError {
    message: String,
    #[source]
    cause: Option<BackendError>,
}

impl DataAccessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: BackendError) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }

    /// Wraps a foreign error, keeping it as the source.
    pub fn wrap(cause: BackendError) -> Self {
        Self::with_cause(cause.to_string(), cause)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

/// Normalizes an adapter error into a [`DataAccessError`].
///
/// A failure that already is a data access failure passes through untouched,
/// including one carried by [`StoreError::DataAccess`]. Everything else is
/// wrapped once with the original kept as the cause.
pub fn normalize(err: BackendError) -> DataAccessError {
    let err = match err.downcast::<DataAccessError>() {
        Ok(existing) => return *existing,
        Err(other) => other,
    };
    match err.downcast::<StoreError>() {
        Ok(store) => match *store {
            StoreError::DataAccess(existing) => existing,
            other => DataAccessError::wrap(Box::new(other)),
        },
        Err(other) => DataAccessError::wrap(other),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation failed: {0}")]
    Execution(#[source] Arc<DataAccessError>),
    #[error("timed out after {waited_ms} ms")]
    Timeout { waited_ms: u64 },
    #[error("wait interrupted")]
    Interrupted,
    #[error(transparent)]
    Decode(#[from] RowDecodeError),
}

impl StoreError {
    pub fn code(&self) -> StoreErrorCode {
        match self {
            StoreError::InvalidArgument(_) => StoreErrorCode::InvalidArgument,
            StoreError::InvalidConfig { .. } => StoreErrorCode::InvalidConfig,
            StoreError::DataAccess(_) => StoreErrorCode::DataAccess,
            StoreError::Cancelled => StoreErrorCode::Cancelled,
            StoreError::Execution(_) => StoreErrorCode::Execution,
            StoreError::Timeout { .. } => StoreErrorCode::Timeout,
            StoreError::Interrupted => StoreErrorCode::Interrupted,
            StoreError::Decode(_) => StoreErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// The failure a completed computation ended with, if this is an
    /// execution failure.
    pub fn execution_cause(&self) -> Option<&DataAccessError> {
        match self {
            StoreError::Execution(cause) => Some(cause),
            _ => None,
        }
    }
}
