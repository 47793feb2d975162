use crate::error::BackendError;
use crate::types::{Filter, OperationResult, Row, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteKind {
    Insert {
        rows: Vec<Row>,
    },
    Update {
        assignments: Vec<(String, Value)>,
        filter: Option<Filter>,
    },
    Delete {
        filter: Option<Filter>,
    },
}

/// A fully resolved write against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    pub target: String,
    pub kind: WriteKind,
}

impl WriteOperation {
    pub fn insert(target: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            target: target.into(),
            kind: WriteKind::Insert { rows },
        }
    }

    pub fn update(
        target: impl Into<String>,
        assignments: Vec<(String, Value)>,
        filter: Option<Filter>,
    ) -> Self {
        Self {
            target: target.into(),
            kind: WriteKind::Update {
                assignments,
                filter,
            },
        }
    }

    pub fn delete(target: impl Into<String>, filter: Option<Filter>) -> Self {
        Self {
            target: target.into(),
            kind: WriteKind::Delete { filter },
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            WriteKind::Insert { .. } => "insert",
            WriteKind::Update { .. } => "update",
            WriteKind::Delete { .. } => "delete",
        }
    }
}

/// Backend primitive that performs a single write synchronously.
///
/// Implementations own any retry policy; callers invoke this exactly once per
/// scheduled operation.
pub trait WriteAdapter: Send + Sync {
    fn execute_write(&self, op: &WriteOperation) -> Result<OperationResult, BackendError>;
}
