//! # pg-table-migrate
//!
//! Chunked PostgreSQL table-to-table migration library.
//!
//! This library moves one table between PostgreSQL databases without ever
//! holding the full dataset in memory:
//!
//! - **Bounded chunks** read under a stable ordering (keyset pagination when
//!   the table has a single integer primary key, offset otherwise)
//! - **Field normalization** per chunk: whitespace trimming and configurable
//!   NULL defaults
//! - **Per-chunk transactions** on the target, committed independently
//! - **Resource-safe lifecycles**: both connections are released on every
//!   exit path, success or failure
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_table_migrate::{Config, MigrationPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let pipeline = MigrationPipeline::new(config);
//!     let result = pipeline.run().await?;
//!     println!("Migrated {} records", result.records_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
mod connect;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod target;
pub mod transform;

// Re-exports for convenient access
pub use config::{Config, DbConfig, MigrationSettings, TransformSettings};
pub use crate::core::{Chunk, Cursor, Extract, Load, Record, TableProfile, Value, ValueKind};
pub use error::{MigrateError, Result, Stage};
pub use pipeline::{
    ConnectionManager, HealthCheckResult, MigrationLog, MigrationPipeline, MigrationResult,
    TracingLog, ValidationResult,
};
pub use source::PgExtractor;
pub use target::PgLoader;
pub use transform::Transformer;
