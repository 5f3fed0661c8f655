//! Per-chunk field normalization.
//!
//! The transformer is a pure function over chunks: no I/O, no shared state.
//! Text fields are trimmed, NULL fields are replaced according to the
//! configured policy (never forward a NULL where a default is defined for
//! that column).

use crate::config::{ColumnDefault, TransformSettings};
use crate::core::value::{Chunk, Value, ValueKind};
use crate::error::{MigrateError, Result};

/// Applies field-level normalization to one chunk at a time.
pub struct Transformer {
    settings: TransformSettings,
    table: String,
}

impl Transformer {
    /// Create a transformer for the named table.
    pub fn new(settings: TransformSettings, table: impl Into<String>) -> Self {
        Self {
            settings,
            table: table.into(),
        }
    }

    /// Normalize every record in the chunk.
    ///
    /// Never fails for well-formed input; a record whose field count does
    /// not match the chunk header is rejected, fatal for the run.
    pub fn transform(&self, mut chunk: Chunk) -> Result<Chunk> {
        let width = chunk.columns.len();

        for (idx, row) in chunk.rows.iter_mut().enumerate() {
            if row.len() != width {
                return Err(MigrateError::transform(
                    &self.table,
                    format!(
                        "record {} has {} fields, expected {}",
                        idx,
                        row.len(),
                        width
                    ),
                ));
            }

            for (value, column) in row.iter_mut().zip(&chunk.columns) {
                self.normalize(value, column)?;
            }
        }

        Ok(chunk)
    }

    fn normalize(&self, value: &mut Value, column: &str) -> Result<()> {
        if let Value::Null(kind) = value {
            if let Some(replacement) = self.null_replacement(column, *kind)? {
                *value = replacement;
            }
        }

        // Replacements are trimmed too, keeping the transform idempotent.
        if self.settings.trim_text {
            if let Value::Text(s) = value {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
        }

        Ok(())
    }

    /// Configured replacement for a NULL in the given column, if any.
    fn null_replacement(&self, column: &str, kind: ValueKind) -> Result<Option<Value>> {
        if let Some(default) = self.settings.column_defaults.get(column) {
            let value = match (default, kind) {
                (ColumnDefault::Text(s), ValueKind::Text) => Value::Text(s.clone()),
                (ColumnDefault::Integer(i), ValueKind::Integer) => Value::Integer(*i),
                (ColumnDefault::Float(f), ValueKind::Float) => Value::Float(*f),
                // YAML parses `0` as an integer even for float columns.
                (ColumnDefault::Integer(i), ValueKind::Float) => Value::Float(*i as f64),
                _ => {
                    return Err(MigrateError::transform(
                        &self.table,
                        format!(
                            "configured default for column {} does not match its {:?} type",
                            column, kind
                        ),
                    ))
                }
            };
            return Ok(Some(value));
        }

        Ok(match kind {
            ValueKind::Text => self
                .settings
                .text_null_default
                .as_ref()
                .map(|s| Value::Text(s.clone())),
            ValueKind::Integer => self.settings.integer_null_default.map(Value::Integer),
            ValueKind::Float => self.settings.float_null_default.map(Value::Float),
        })
    }
}
