//! In-process backend implementing every adapter contract of the crate.
//!
//! Tables hold positional rows with named columns. Locks are per target:
//! any number of shared readers or one exclusive writer. A lock attempt
//! waits up to the `LOCK_TIMEOUT` parameter and otherwise tries once.

use crate::error::{BackendError, DataAccessError, StoreError};
use crate::operation::{WriteAdapter, WriteKind, WriteOperation};
use crate::query::adapter::{LockQueryAdapter, QueryAdapter, RowStream};
use crate::query::config::{LockMode, QueryConfig};
use crate::types::{Filter, OperationResult, Row, Value};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct Table {
    columns: Vec<String>,
    generated_key: Option<usize>,
    rows: Vec<Row>,
    next_key: i64,
}

impl Table {
    fn column_index(&self, target: &str, column: &str) -> Result<usize, DataAccessError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DataAccessError::new(format!("unknown column '{column}' in '{target}'")))
    }

    fn resolve_filter(
        &self,
        target: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<(usize, Value)>, DataAccessError> {
        let mut terms = Vec::new();
        if let Some(filter) = filter {
            self.collect_terms(target, filter, &mut terms)?;
        }
        Ok(terms)
    }

    fn collect_terms(
        &self,
        target: &str,
        filter: &Filter,
        out: &mut Vec<(usize, Value)>,
    ) -> Result<(), DataAccessError> {
        match filter {
            Filter::Eq(column, value) => {
                out.push((self.column_index(target, column)?, value.clone()));
            }
            Filter::And(lhs, rhs) => {
                self.collect_terms(target, lhs, out)?;
                self.collect_terms(target, rhs, out)?;
            }
        }
        Ok(())
    }
}

fn matches(terms: &[(usize, Value)], row: &Row) -> bool {
    terms
        .iter()
        .all(|(index, expected)| row.values.get(*index) == Some(expected))
}

#[derive(Debug, Default)]
struct TargetLock {
    readers: usize,
    writer: bool,
}

impl TargetLock {
    fn grant(&mut self, exclusive: bool) -> bool {
        if self.writer || (exclusive && self.readers > 0) {
            return false;
        }
        if exclusive {
            self.writer = true;
        } else {
            self.readers += 1;
        }
        true
    }

    fn is_free(&self) -> bool {
        !self.writer && self.readers == 0
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    locks: Mutex<HashMap<String, TargetLock>>,
    released: Condvar,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table. When `generated_key` names a column, inserts that
    /// leave it `Null` receive the next integer key.
    pub fn create_table(
        &self,
        name: &str,
        columns: &[&str],
        generated_key: Option<&str>,
    ) -> Result<(), StoreError> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let generated_key = match generated_key {
            Some(key) => Some(columns.iter().position(|c| c == key).ok_or_else(|| {
                StoreError::InvalidArgument(format!("generated key '{key}' is not a column"))
            })?),
            None => None,
        };
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(StoreError::InvalidArgument(format!(
                "table '{name}' already exists"
            )));
        }
        tables.insert(
            name.to_string(),
            Table {
                columns,
                generated_key,
                rows: Vec::new(),
                next_key: 1,
            },
        );
        Ok(())
    }

    pub fn row_count(&self, target: &str) -> Option<usize> {
        self.tables.read().get(target).map(|t| t.rows.len())
    }

    /// Releases one hold of `mode` on `target`. Returns `false` if no such
    /// hold existed.
    pub fn unlock(&self, target: &str, mode: &LockMode) -> bool {
        let mut locks = self.locks.lock();
        let Some(lock) = locks.get_mut(target) else {
            return false;
        };
        let released = match mode {
            LockMode::PessimisticWrite if lock.writer => {
                lock.writer = false;
                true
            }
            LockMode::PessimisticRead if lock.readers > 0 => {
                lock.readers -= 1;
                true
            }
            _ => false,
        };
        if lock.is_free() {
            locks.remove(target);
        }
        drop(locks);
        if released {
            self.released.notify_all();
        }
        released
    }

    pub fn is_locked(&self, target: &str) -> bool {
        self.locks
            .lock()
            .get(target)
            .is_some_and(|lock| !lock.is_free())
    }

    fn acquire(&self, query: &QueryConfig, exclusive: bool) -> bool {
        let target = query.target();
        let deadline = query
            .lock_timeout()
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let mut locks = self.locks.lock();
        loop {
            if locks.entry(target.to_string()).or_default().grant(exclusive) {
                return true;
            }
            let Some(deadline) = deadline else {
                debug!(target_name = target, exclusive, "lock busy");
                return false;
            };
            if Instant::now() >= deadline
                || self.released.wait_until(&mut locks, deadline).timed_out()
            {
                // One last look: a release may have raced the deadline.
                if locks.entry(target.to_string()).or_default().grant(exclusive) {
                    return true;
                }
                warn!(target_name = target, exclusive, "lock wait timed out");
                return false;
            }
        }
    }
}

impl WriteAdapter for MemoryStore {
    fn execute_write(&self, op: &WriteOperation) -> Result<OperationResult, BackendError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&op.target)
            .ok_or_else(|| DataAccessError::new(format!("unknown target '{}'", op.target)))?;
        match &op.kind {
            WriteKind::Insert { rows } => {
                let width = table.columns.len();
                if let Some(bad) = rows.iter().find(|r| r.len() != width) {
                    return Err(DataAccessError::new(format!(
                        "row has {} values, '{}' expects {width}",
                        bad.len(),
                        op.target
                    ))
                    .into());
                }
                let mut generated = Vec::new();
                for row in rows {
                    let mut row = row.clone();
                    if let Some(index) = table.generated_key {
                        if row.values[index].is_null() {
                            let key = table.next_key;
                            table.next_key += 1;
                            row.values[index] = Value::Integer(key);
                            generated.push((table.columns[index].clone(), Value::Integer(key)));
                        } else if let Value::Integer(explicit) = row.values[index] {
                            table.next_key = table.next_key.max(explicit.saturating_add(1));
                        }
                    }
                    table.rows.push(row);
                }
                Ok(OperationResult::with_generated_keys(
                    rows.len() as u64,
                    generated,
                ))
            }
            WriteKind::Update {
                assignments,
                filter,
            } => {
                let terms = table.resolve_filter(&op.target, filter.as_ref())?;
                let assignments = assignments
                    .iter()
                    .map(|(column, value)| {
                        Ok((table.column_index(&op.target, column)?, value.clone()))
                    })
                    .collect::<Result<Vec<_>, DataAccessError>>()?;
                let mut affected = 0;
                for row in table.rows.iter_mut().filter(|row| matches(&terms, row)) {
                    for (index, value) in &assignments {
                        row.values[*index] = value.clone();
                    }
                    affected += 1;
                }
                Ok(OperationResult::new(affected))
            }
            WriteKind::Delete { filter } => {
                let terms = table.resolve_filter(&op.target, filter.as_ref())?;
                let before = table.rows.len();
                table.rows.retain(|row| !matches(&terms, row));
                Ok(OperationResult::new((before - table.rows.len()) as u64))
            }
        }
    }
}

impl QueryAdapter for MemoryStore {
    fn stream(&self, query: &QueryConfig) -> Result<RowStream, BackendError> {
        let tables = self.tables.read();
        let table = tables
            .get(query.target())
            .ok_or_else(|| DataAccessError::new(format!("unknown target '{}'", query.target())))?;
        let terms = table.resolve_filter(query.target(), query.filter())?;
        let projection = query
            .projection()
            .names()
            .iter()
            .map(|column| table.column_index(query.target(), column))
            .collect::<Result<Vec<_>, DataAccessError>>()?;
        let limit = query.limit().unwrap_or(usize::MAX);
        let rows: Vec<Result<Row, BackendError>> = table
            .rows
            .iter()
            .filter(|row| matches(&terms, row))
            .take(limit)
            .map(|row| {
                if projection.is_empty() {
                    Ok(row.clone())
                } else {
                    Ok(Row::from_values(
                        projection.iter().map(|i| row.values[*i].clone()).collect(),
                    ))
                }
            })
            .collect();
        Ok(Box::new(rows.into_iter()))
    }
}

impl LockQueryAdapter for MemoryStore {
    fn try_lock(&self, query: &QueryConfig) -> Result<bool, BackendError> {
        if !self.tables.read().contains_key(query.target()) {
            return Err(DataAccessError::new(format!("unknown target '{}'", query.target())).into());
        }
        match query.lock_mode() {
            None => Err(DataAccessError::new("query carries no lock mode").into()),
            Some(LockMode::None | LockMode::Optimistic) => Ok(true),
            Some(LockMode::PessimisticRead) => Ok(self.acquire(query, false)),
            Some(LockMode::PessimisticWrite) => Ok(self.acquire(query, true)),
            Some(LockMode::Custom(name)) => {
                Err(DataAccessError::new(format!("unsupported lock mode '{name}'")).into())
            }
        }
    }
}
