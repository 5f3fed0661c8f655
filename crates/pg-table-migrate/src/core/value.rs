//! Field values and chunks for table-agnostic data transfer.

use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// Type hint carried by NULL values.
///
/// A NULL on its own says nothing about the column it came from; the hint
/// lets the transformer pick the right configured default and the loader
/// emit the correct wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
}

/// A single field value: string, number, or NULL.
///
/// This is deliberately narrower than a general SQL value model. The
/// pipeline normalizes basic scalar fields only; columns outside these
/// classes are rejected when the table profile loads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL with a type hint for defaulting and wire encoding.
    Null(ValueKind),

    /// Text/string data.
    Text(String),

    /// 64-bit signed integer (covers smallint/int/bigint sources).
    Integer(i64),

    /// 64-bit floating point (covers real/double/numeric sources).
    Float(f64),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// The kind of this value (for NULLs, the carried hint).
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null(k) => *k,
            Value::Text(_) => ValueKind::Text,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

// Values travel to the target as text/int8/float8 parameters; the load
// statement casts each placeholder so the server coerces to the column type.
impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null(_) => Ok(IsNull::Yes),
            Value::Text(v) => v.to_sql(ty, out),
            Value::Integer(v) => v.to_sql(ty, out),
            Value::Float(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::INT8 || *ty == Type::FLOAT8
    }

    to_sql_checked!();
}

/// One row: an ordered sequence of values, positionally matching the
/// owning chunk's column header.
pub type Record = Vec<Value>;

/// A bounded slice of the source table.
///
/// An empty chunk is the pipeline's termination signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Ordered column names shared by every record.
    pub columns: Vec<String>,

    /// Records in source order.
    pub rows: Vec<Record>,

    /// Last key value in this chunk, for keyset cursor continuity.
    pub last_key: Option<i64>,
}

impl Chunk {
    /// Create a new chunk with the given header and records.
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            columns,
            rows,
            last_key: None,
        }
    }

    /// Create the empty chunk that terminates a run.
    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// Set the last key for keyset pagination.
    pub fn with_last_key(mut self, key: Option<i64>) -> Self {
        self.last_key = key;
        self
    }

    /// Number of records in this chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
