// Execution result types
//
// Runtime values, the tuple wire format, and the error surface of the
// executor layer.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::index::btree::BTreeError;
use crate::storage::buffer::BufferPoolError;
use crate::storage::heap::HeapError;
use crate::transaction::concurrency::transaction::TransactionError;

/// Possible runtime values of a tuple field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(v) => write!(f, "{}", v),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, _) | (_, DataValue::Null) => None,
            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => a.partial_cmp(b),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl DataValue {
    /// Total order for sorting: NULL sorts first, incomparable types
    /// order by a fixed type rank, NaN-safe floats.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Ordering::Equal,
            (DataValue::Null, _) => Ordering::Less,
            (_, DataValue::Null) => Ordering::Greater,
            _ => match self.partial_cmp(other) {
                Some(ordering) => ordering,
                None => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            DataValue::Null => 0,
            DataValue::Boolean(_) => 1,
            DataValue::Integer(_) | DataValue::Float(_) => 2,
            DataValue::Text(_) => 3,
        }
    }
}

/// A row of values. The wire format is opaque bytes produced by the
/// serializer; the schema gives the bytes meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    pub fn to_bytes(&self) -> ExecutionResult<Vec<u8>> {
        bincode::serialize(&self.values).map_err(|e| ExecutionError::TupleCodec(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> ExecutionResult<Self> {
        let values =
            bincode::deserialize(bytes).map_err(|e| ExecutionError::TupleCodec(e.to_string()))?;
        Ok(Self { values })
    }

    /// Integer key for index maintenance, pulled from one column.
    pub fn key_at(&self, index: usize) -> ExecutionResult<i64> {
        match self.value(index) {
            Some(DataValue::Integer(key)) => Ok(*key),
            other => Err(ExecutionError::TupleCodec(format!(
                "column {} is not an integer key: {:?}",
                index, other
            ))),
        }
    }

    /// Concatenation of two rows, as a join produces.
    pub fn join(&self, other: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend(other.values.iter().cloned());
        Tuple::new(values)
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("transaction aborted: {0}")]
    TransactionAbort(#[from] TransactionError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("index error: {0}")]
    Index(#[from] BTreeError),

    #[error("buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("tuple codec error: {0}")]
    TupleCodec(String),

    #[error("execution error: {0}")]
    Internal(String),
}

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_roundtrip() {
        let tuple = Tuple::new(vec![
            DataValue::Integer(42),
            DataValue::Text("hello".into()),
            DataValue::Null,
            DataValue::Boolean(false),
            DataValue::Float(2.25),
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }

    #[test]
    fn test_total_cmp_orders_nulls_first() {
        let mut values = vec![
            DataValue::Integer(3),
            DataValue::Null,
            DataValue::Integer(1),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![DataValue::Null, DataValue::Integer(1), DataValue::Integer(3)]
        );
    }

    #[test]
    fn test_key_at() {
        let tuple = Tuple::new(vec![DataValue::Text("k".into()), DataValue::Integer(9)]);
        assert_eq!(tuple.key_at(1).unwrap(), 9);
        assert!(tuple.key_at(0).is_err());
    }
}
