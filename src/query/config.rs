use crate::error::StoreError;
use crate::types::{Filter, Value};
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Parameter key carrying the requested [`LockMode`].
pub const LOCK_MODE: &str = "lock.mode";
/// Parameter key carrying the lock wait in milliseconds. Only present when a
/// finite timeout was requested.
pub const LOCK_TIMEOUT: &str = "lock.timeout";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    None,
    PessimisticRead,
    PessimisticWrite,
    Optimistic,
    /// Backend-specific mode, identified by name.
    Custom(String),
}

impl LockMode {
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            LockMode::Custom(name) if name.trim().is_empty() => Err(StoreError::InvalidArgument(
                "custom lock mode requires a name".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, LockMode::PessimisticWrite)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::None => write!(f, "NONE"),
            LockMode::PessimisticRead => write!(f, "PESSIMISTIC_READ"),
            LockMode::PessimisticWrite => write!(f, "PESSIMISTIC_WRITE"),
            LockMode::Optimistic => write!(f, "OPTIMISTIC"),
            LockMode::Custom(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    LockMode(LockMode),
    Millis(u64),
    Value(Value),
}

/// Column selection applied to streamed rows. An empty projection keeps
/// every column in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    columns: Vec<String>,
}

impl Projection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.columns
    }
}

/// Immutable query description handed to adapters.
///
/// Cloning is cheap; every `with_*` call returns a new value and leaves the
/// receiver untouched, so a configuration can be shared across threads and
/// reused as a template.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    target: Arc<str>,
    projection: Projection,
    filter: Option<Filter>,
    limit: Option<usize>,
    parameters: OrdMap<String, Param>,
}

impl QueryConfig {
    pub fn new(target: impl AsRef<str>) -> Self {
        Self {
            target: Arc::from(target.as_ref()),
            projection: Projection::all(),
            filter: None,
            limit: None,
            parameters: OrdMap::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn parameter(&self, key: &str) -> Option<&Param> {
        self.parameters.get(key)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&String, &Param)> {
        self.parameters.iter()
    }

    pub fn with_projection(&self, projection: Projection) -> Self {
        Self {
            projection,
            ..self.clone()
        }
    }

    pub fn with_filter(&self, filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..self.clone()
        }
    }

    pub fn with_limit(&self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Sets `key`, replacing any earlier value.
    pub fn with_parameter(&self, key: impl Into<String>, value: Param) -> Self {
        Self {
            parameters: self.parameters.update(key.into(), value),
            ..self.clone()
        }
    }

    pub fn without_parameter(&self, key: &str) -> Self {
        Self {
            parameters: self.parameters.without(key),
            ..self.clone()
        }
    }

    pub fn lock_mode(&self) -> Option<&LockMode> {
        match self.parameter(LOCK_MODE) {
            Some(Param::LockMode(mode)) => Some(mode),
            _ => None,
        }
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        match self.parameter(LOCK_TIMEOUT) {
            Some(Param::Millis(ms)) => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}
