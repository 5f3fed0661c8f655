//! PostgreSQL target loader.
//!
//! Writes one transformed chunk per call using multi-row parameterized
//! INSERT inside a single transaction, so each chunk lands all-or-nothing.
//! Placeholders carry explicit casts for the value classes; the server
//! coerces to the actual column types on assignment.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::config::DbConfig;
use crate::connect::{open_pool, qualify_table, quote_ident};
use crate::core::traits::Load;
use crate::core::value::{Chunk, Value, ValueKind};
use crate::error::{MigrateError, Result};

/// PostgreSQL wire protocol limit on bind parameters per statement.
const MAX_PARAMS: usize = 65_535;

/// PostgreSQL implementation of [`Load`].
pub struct PgLoader {
    pool: Pool,
    schema: String,
    table: String,
}

impl PgLoader {
    /// Open a pool against the target database.
    pub async fn connect(config: &DbConfig, table: &str) -> Result<Self> {
        let pool = open_pool(config, "target").await?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
            table: table.to_string(),
        })
    }

    fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

#[async_trait]
impl Load for PgLoader {
    async fn load_chunk(&self, chunk: &Chunk) -> Result<u64> {
        if chunk.is_empty() {
            return Ok(0);
        }

        let table = self.full_name();
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::load(&table, e))?;

        let tx = client
            .transaction()
            .await
            .map_err(|e| MigrateError::load(&table, e))?;

        // Every value in a column shares the source column's class, so the
        // first record determines the placeholder casts.
        let kinds: Vec<ValueKind> = chunk.rows[0].iter().map(Value::kind).collect();
        let per_statement = rows_per_statement(chunk.columns.len());

        let mut written = 0u64;
        for batch in chunk.rows.chunks(per_statement) {
            let sql = insert_statement(
                &self.schema,
                &self.table,
                &chunk.columns,
                &kinds,
                batch.len(),
            );
            let params: Vec<&(dyn ToSql + Sync)> = batch
                .iter()
                .flatten()
                .map(|v| v as &(dyn ToSql + Sync))
                .collect();

            written += tx
                .execute(sql.as_str(), &params)
                .await
                .map_err(|e| MigrateError::load(&table, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::load(&table, e))?;

        debug!("{}: wrote {} records", table, written);
        Ok(written)
    }

    async fn row_count(&self) -> Result<i64> {
        let table = self.full_name();
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::load(&table, e))?;
        let query = format!("SELECT COUNT(*) FROM {}", qualify_table(&self.schema, &self.table));
        let row = client
            .query_one(query.as_str(), &[])
            .await
            .map_err(|e| MigrateError::load(&table, e))?;
        Ok(row.get(0))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Records per INSERT statement under the protocol parameter limit.
fn rows_per_statement(num_columns: usize) -> usize {
    (MAX_PARAMS / num_columns.max(1)).max(1)
}

/// SQL type forced onto a placeholder for each value class.
fn cast_for(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Text => "text",
        ValueKind::Integer => "int8",
        ValueKind::Float => "float8",
    }
}

/// Build a multi-row INSERT with cast placeholders.
fn insert_statement(
    schema: &str,
    table: &str,
    columns: &[String],
    kinds: &[ValueKind],
    num_rows: usize,
) -> String {
    let col_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut rows = Vec::with_capacity(num_rows);
    let mut param = 0;
    for _ in 0..num_rows {
        let placeholders = kinds
            .iter()
            .map(|kind| {
                param += 1;
                format!("${}::{}", param, cast_for(*kind))
            })
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(format!("({})", placeholders));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualify_table(schema, table),
        col_list,
        rows.join(", ")
    )
}
