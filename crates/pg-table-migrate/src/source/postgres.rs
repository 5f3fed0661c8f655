//! PostgreSQL source extractor.
//!
//! Reads the source table in bounded chunks under a stable ordering.
//! Keyset pagination is used when the table has a single integer-typed
//! primary key; otherwise the extractor falls back to offset pagination
//! over an ORDER BY of every column, which is stable only while the
//! source is not being written concurrently.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::Row;
use tracing::debug;

use crate::config::DbConfig;
use crate::connect::{open_pool, qualify_table, quote_ident};
use crate::core::traits::{ColumnInfo, Cursor, Extract, TableProfile};
use crate::core::value::{Chunk, Record, Value, ValueKind};
use crate::error::{MigrateError, Result};

/// PostgreSQL implementation of [`Extract`].
pub struct PgExtractor {
    pool: Pool,
    profile: TableProfile,
}

impl PgExtractor {
    /// Open a pool against the source database and load the table profile.
    pub async fn connect(config: &DbConfig, table: &str) -> Result<Self> {
        let pool = open_pool(config, "source").await?;
        let profile = load_profile(&pool, &config.schema, table).await?;

        debug!(
            "Profiled {}: {} columns, key column {:?}",
            profile.full_name(),
            profile.columns.len(),
            profile.key_column
        );

        Ok(Self { pool, profile })
    }
}

#[async_trait]
impl Extract for PgExtractor {
    fn profile(&self) -> &TableProfile {
        &self.profile
    }

    async fn next_chunk(&self, cursor: &Cursor, chunk_size: usize) -> Result<Chunk> {
        let table = self.profile.full_name();
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::extract(&table, e))?;

        let rows = match cursor {
            Cursor::Keyset { last_pk } => {
                let key = self.profile.key_column.as_deref().ok_or_else(|| {
                    MigrateError::extract(&table, "keyset cursor requires a key column")
                })?;
                let query = keyset_query(&self.profile, key, last_pk.is_some(), chunk_size);
                match last_pk {
                    Some(pk) => client.query(query.as_str(), &[pk]).await,
                    None => client.query(query.as_str(), &[]).await,
                }
            }
            Cursor::Offset { rows_read } => {
                let query = offset_query(&self.profile, *rows_read, chunk_size);
                client.query(query.as_str(), &[]).await
            }
        }
        .map_err(|e| MigrateError::extract(&table, e))?;

        let mut records: Vec<Record> = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(decode_row(&self.profile, row)?);
        }

        let last_key = match cursor {
            Cursor::Keyset { .. } => last_key_of(&self.profile, &records),
            Cursor::Offset { .. } => None,
        };

        Ok(Chunk::new(self.profile.column_names(), records).with_last_key(last_key))
    }

    async fn row_count(&self) -> Result<i64> {
        let table = self.profile.full_name();
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::extract(&table, e))?;
        let query = format!(
            "SELECT COUNT(*) FROM {}",
            qualify_table(&self.profile.schema, &self.profile.table)
        );
        let row = client
            .query_one(query.as_str(), &[])
            .await
            .map_err(|e| MigrateError::extract(&table, e))?;
        Ok(row.get(0))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Load column and key metadata for the source table.
async fn load_profile(pool: &Pool, schema: &str, table: &str) -> Result<TableProfile> {
    let full_name = format!("{}.{}", schema, table);
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::extract(&full_name, e))?;

    let columns_query = r#"
        SELECT column_name, udt_name
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
    "#;

    let rows = client
        .query(columns_query, &[&schema, &table])
        .await
        .map_err(|e| MigrateError::extract(&full_name, e))?;

    if rows.is_empty() {
        return Err(MigrateError::extract(
            &full_name,
            "table not found (no columns in information_schema)",
        ));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.get(0);
        let data_type: String = row.get(1);
        let kind = column_kind(&data_type).ok_or_else(|| {
            MigrateError::extract(
                &full_name,
                format!(
                    "column {} has unsupported type {} (supported: text, integer, float)",
                    name, data_type
                ),
            )
        })?;
        columns.push(ColumnInfo {
            name,
            data_type,
            kind,
        });
    }

    let pk_query = r#"
        SELECT a.attname
        FROM pg_catalog.pg_constraint c
        JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
        WHERE n.nspname = $1
          AND t.relname = $2
          AND c.contype = 'p'
          AND a.attnum = ANY(c.conkey)
        ORDER BY array_position(c.conkey, a.attnum)
    "#;

    let pk_rows = client
        .query(pk_query, &[&schema, &table])
        .await
        .map_err(|e| MigrateError::extract(&full_name, e))?;
    let pk_names: Vec<String> = pk_rows.iter().map(|r| r.get(0)).collect();

    let profile = TableProfile {
        schema: schema.to_string(),
        table: table.to_string(),
        key_column: keyset_column(&columns, &pk_names),
        columns,
    };

    Ok(profile)
}

/// Map a PostgreSQL udt name to a value class.
fn column_kind(data_type: &str) -> Option<ValueKind> {
    match data_type {
        "int2" | "int4" | "int8" => Some(ValueKind::Integer),
        "float4" | "float8" | "numeric" => Some(ValueKind::Float),
        "text" | "varchar" | "bpchar" | "name" => Some(ValueKind::Text),
        _ => None,
    }
}

/// A primary key usable for keyset pagination: a single integer column.
fn keyset_column(columns: &[ColumnInfo], pk_names: &[String]) -> Option<String> {
    if pk_names.len() != 1 {
        return None;
    }
    let pk = &pk_names[0];
    columns
        .iter()
        .find(|c| &c.name == pk && matches!(c.data_type.as_str(), "int2" | "int4" | "int8"))
        .map(|c| c.name.clone())
}

/// Build the keyset SELECT: `WHERE key > $1` on all calls after the first.
fn keyset_query(profile: &TableProfile, key: &str, with_bound: bool, chunk_size: usize) -> String {
    let col_list = column_list(profile);
    let table_ref = qualify_table(&profile.schema, &profile.table);
    let key_quoted = quote_ident(key);

    let mut query = format!("SELECT {} FROM {}", col_list, table_ref);
    if with_bound {
        query.push_str(&format!(" WHERE {} > $1", key_quoted));
    }
    query.push_str(&format!(" ORDER BY {} LIMIT {}", key_quoted, chunk_size));
    query
}

/// Build the offset SELECT under an ORDER BY of every column.
fn offset_query(profile: &TableProfile, rows_read: i64, chunk_size: usize) -> String {
    let col_list = column_list(profile);
    let table_ref = qualify_table(&profile.schema, &profile.table);

    format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
        col_list, table_ref, col_list, chunk_size, rows_read
    )
}

fn column_list(profile: &TableProfile) -> String {
    profile
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode one wire row into a record, positionally matching the profile.
fn decode_row(profile: &TableProfile, row: &Row) -> Result<Record> {
    let table = profile.full_name();
    let mut record = Vec::with_capacity(profile.columns.len());

    for (idx, col) in profile.columns.iter().enumerate() {
        let value = decode_field(row, idx, col).map_err(|e| {
            MigrateError::extract(&table, format!("decoding column {}: {}", col.name, e))
        })?;
        record.push(value);
    }

    Ok(record)
}

/// Decode one field by its profiled type; the caller adds table context.
fn decode_field(row: &Row, idx: usize, col: &ColumnInfo) -> std::result::Result<Value, String> {
    let value = match col.data_type.as_str() {
        "int2" => int_value(
            row.try_get::<_, Option<i16>>(idx)
                .map_err(|e| e.to_string())?
                .map(i64::from),
        ),
        "int4" => int_value(
            row.try_get::<_, Option<i32>>(idx)
                .map_err(|e| e.to_string())?
                .map(i64::from),
        ),
        "int8" => int_value(row.try_get::<_, Option<i64>>(idx).map_err(|e| e.to_string())?),
        "float4" => float_value(
            row.try_get::<_, Option<f32>>(idx)
                .map_err(|e| e.to_string())?
                .map(f64::from),
        ),
        "float8" => float_value(row.try_get::<_, Option<f64>>(idx).map_err(|e| e.to_string())?),
        "numeric" => match row
            .try_get::<_, Option<Decimal>>(idx)
            .map_err(|e| e.to_string())?
        {
            Some(d) => Value::Float(
                d.to_f64()
                    .ok_or_else(|| "numeric value does not fit a float".to_string())?,
            ),
            None => Value::Null(ValueKind::Float),
        },
        "text" | "varchar" | "bpchar" | "name" => {
            text_value(row.try_get::<_, Option<String>>(idx).map_err(|e| e.to_string())?)
        }
        other => return Err(format!("unsupported type {}", other)),
    };

    Ok(value)
}

fn int_value(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null(ValueKind::Integer))
}

fn float_value(v: Option<f64>) -> Value {
    v.map(Value::Float).unwrap_or(Value::Null(ValueKind::Float))
}

fn text_value(v: Option<String>) -> Value {
    v.map(Value::Text).unwrap_or(Value::Null(ValueKind::Text))
}

/// Key value of the last record, for cursor continuity.
fn last_key_of(profile: &TableProfile, records: &[Record]) -> Option<i64> {
    let key = profile.key_column.as_deref()?;
    let idx = profile.columns.iter().position(|c| c.name == key)?;
    records.last().and_then(|row| match row.get(idx) {
        Some(Value::Integer(v)) => Some(*v),
        _ => None,
    })
}
