use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Blob(Vec<u8>),
    Null,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "Text",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Boolean(_) => "Boolean",
            Value::Blob(_) => "Blob",
            Value::Null => "Null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Row predicate understood by the bundled backend. Real backends receive it
/// inside the query configuration and may translate it however they like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, Value),
    And(Box<Filter>, Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn and(self, rhs: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(rhs))
    }
}

/// Outcome of a completed write: how many elements were touched and which
/// keys the backend generated, in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationResult {
    affected: u64,
    generated_keys: Vec<(String, Value)>,
}

impl OperationResult {
    pub fn new(affected: u64) -> Self {
        Self {
            affected,
            generated_keys: Vec::new(),
        }
    }

    pub fn with_generated_keys(affected: u64, generated_keys: Vec<(String, Value)>) -> Self {
        Self {
            affected,
            generated_keys,
        }
    }

    pub fn affected(&self) -> u64 {
        self.affected
    }

    pub fn generated_keys(&self) -> &[(String, Value)] {
        &self.generated_keys
    }

    pub fn generated_key(&self, column: &str) -> Option<&Value> {
        self.generated_keys
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

pub trait TryFromRow: Sized {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError>;
}

impl TryFromRow for Row {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError> {
        Ok(row)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDecodeError {
    #[error("missing column '{column}' at index {index}")]
    MissingColumn { column: String, index: usize },
    #[error("column '{column}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{message}")]
    Custom { message: String },
}

fn missing(column: &str, index: usize) -> RowDecodeError {
    RowDecodeError::MissingColumn {
        column: column.to_string(),
        index,
    }
}

fn mismatch(column: &str, expected: &'static str, actual: &Value) -> RowDecodeError {
    RowDecodeError::TypeMismatch {
        column: column.to_string(),
        expected,
        actual: actual.kind(),
    }
}

pub fn text_at<'a>(row: &'a Row, index: usize, column: &str) -> Result<&'a str, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Text(v)) => Ok(v.as_str()),
        Some(other) => Err(mismatch(column, "Text", other)),
        None => Err(missing(column, index)),
    }
}

pub fn i64_at(row: &Row, index: usize, column: &str) -> Result<i64, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Integer(v)) => Ok(*v),
        Some(other) => Err(mismatch(column, "Integer", other)),
        None => Err(missing(column, index)),
    }
}

pub fn bool_at(row: &Row, index: usize, column: &str) -> Result<bool, RowDecodeError> {
    match row.values.get(index) {
        Some(Value::Boolean(v)) => Ok(*v),
        Some(other) => Err(mismatch(column, "Boolean", other)),
        None => Err(missing(column, index)),
    }
}

#[cfg(test)]
mod tests {
    use super::{OperationResult, Row, RowDecodeError, Value, i64_at, text_at};

    #[test]
    fn row_accessors_report_mismatch_and_missing_columns() {
        let row = Row::from_values(vec![Value::from("u1"), Value::Integer(7)]);
        assert_eq!(text_at(&row, 0, "id").expect("id"), "u1");
        assert_eq!(i64_at(&row, 1, "age").expect("age"), 7);
        assert_eq!(
            i64_at(&row, 0, "id"),
            Err(RowDecodeError::TypeMismatch {
                column: "id".into(),
                expected: "Integer",
                actual: "Text",
            })
        );
        assert_eq!(
            text_at(&row, 5, "name"),
            Err(RowDecodeError::MissingColumn {
                column: "name".into(),
                index: 5,
            })
        );
    }

    #[test]
    fn operation_result_looks_up_generated_keys() {
        let result = OperationResult::with_generated_keys(
            2,
            vec![("id".into(), Value::Integer(1)), ("id".into(), Value::Integer(2))],
        );
        assert_eq!(result.affected(), 2);
        assert_eq!(result.generated_keys().len(), 2);
        assert_eq!(result.generated_key("id"), Some(&Value::Integer(1)));
        assert_eq!(result.generated_key("sku"), None);
    }
}
