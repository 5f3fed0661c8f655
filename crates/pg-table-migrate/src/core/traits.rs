//! Core traits for the chunked migration pipeline.
//!
//! This module defines the pipeline's two seams:
//!
//! - [`Extract`]: reads successive chunks from the source table
//! - [`Load`]: writes transformed chunks to the target table
//!
//! The pipeline drives both strictly sequentially; implementations own their
//! connections and expose an idempotent `close`.

use async_trait::async_trait;

use crate::core::value::{Chunk, ValueKind};
use crate::error::Result;

/// Extraction cursor.
///
/// Encodes enough state that re-invoking [`Extract::next_chunk`] after
/// advancing yields the next disjoint slice of the source: either the last
/// key seen (keyset pagination) or the number of rows already read under a
/// stable total order (offset pagination).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Keyset pagination over a single integer key column.
    Keyset { last_pk: Option<i64> },

    /// Offset pagination under a stable ORDER BY.
    Offset { rows_read: i64 },
}

impl Cursor {
    /// Advance past a chunk that was just processed.
    ///
    /// The offset form moves by exactly the chunk's record count; the keyset
    /// form takes the chunk's last key. Advancing past an empty chunk is a
    /// no-op.
    #[must_use]
    pub fn advanced(&self, chunk: &Chunk) -> Cursor {
        match self {
            Cursor::Keyset { last_pk } => Cursor::Keyset {
                last_pk: chunk.last_key.or(*last_pk),
            },
            Cursor::Offset { rows_read } => Cursor::Offset {
                rows_read: rows_read + chunk.len() as i64,
            },
        }
    }

    /// Human-readable position for progress and failure logs.
    #[must_use]
    pub fn position(&self) -> String {
        match self {
            Cursor::Keyset { last_pk: Some(pk) } => format!("key>{}", pk),
            Cursor::Keyset { last_pk: None } => "key=start".to_string(),
            Cursor::Offset { rows_read } => format!("offset={}", rows_read),
        }
    }
}

/// One column of the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// PostgreSQL type name (`udt_name`), kept for row decoding.
    pub data_type: String,
    /// Value class the column maps to.
    pub kind: ValueKind,
}

/// Source table metadata loaded once when the source connection opens.
#[derive(Debug, Clone, PartialEq)]
pub struct TableProfile {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Single integer-typed primary key column, when the table has one.
    pub key_column: Option<String>,
}

impl TableProfile {
    /// Schema-qualified display name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Ordered column names.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Starting cursor for this table: keyset when a usable key exists,
    /// offset otherwise.
    #[must_use]
    pub fn initial_cursor(&self) -> Cursor {
        if self.key_column.is_some() {
            Cursor::Keyset { last_pk: None }
        } else {
            Cursor::Offset { rows_read: 0 }
        }
    }
}

/// Read successive chunks from the source table.
#[async_trait]
pub trait Extract: Send + Sync {
    /// Metadata for the table being read.
    fn profile(&self) -> &TableProfile;

    /// Fetch the next chunk at the given cursor.
    ///
    /// Successive calls with properly advanced cursors never repeat or skip
    /// rows under a fixed snapshot of the source. Returns an empty chunk
    /// exactly when no further rows satisfy the cursor predicate.
    async fn next_chunk(&self, cursor: &Cursor, chunk_size: usize) -> Result<Chunk>;

    /// Exact row count, for post-run validation.
    async fn row_count(&self) -> Result<i64>;

    /// Close the underlying connection. Idempotent, never fails.
    async fn close(&self);
}

/// Write transformed chunks to the target table.
#[async_trait]
pub trait Load: Send + Sync {
    /// Write all records in the chunk, returning the number written.
    async fn load_chunk(&self, chunk: &Chunk) -> Result<u64>;

    /// Exact row count, for post-run validation.
    async fn row_count(&self) -> Result<i64>;

    /// Close the underlying connection. Idempotent, never fails.
    async fn close(&self);
}

#[async_trait]
impl<T: Extract + ?Sized> Extract for std::sync::Arc<T> {
    fn profile(&self) -> &TableProfile {
        (**self).profile()
    }

    async fn next_chunk(&self, cursor: &Cursor, chunk_size: usize) -> Result<Chunk> {
        (**self).next_chunk(cursor, chunk_size).await
    }

    async fn row_count(&self) -> Result<i64> {
        (**self).row_count().await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

#[async_trait]
impl<T: Load + ?Sized> Load for std::sync::Arc<T> {
    async fn load_chunk(&self, chunk: &Chunk) -> Result<u64> {
        (**self).load_chunk(chunk).await
    }

    async fn row_count(&self) -> Result<i64> {
        (**self).row_count().await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
