//! Configuration type definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection.
    pub source: DbConfig,

    /// Target database connection.
    pub target: DbConfig,

    /// Migration behavior configuration.
    pub migration: MigrationSettings,

    /// Per-field normalization configuration.
    #[serde(default)]
    pub transform: TransformSettings,
}

/// PostgreSQL connection descriptor, used for both source and target.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

// Manual Debug so passwords never reach logs or error output.
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Table to read from the source database.
    pub source_table: String,

    /// Table to write in the target database (default: same as source).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,

    /// Records per chunk (default: 1000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl MigrationSettings {
    /// Effective target table name.
    pub fn target_table(&self) -> &str {
        self.target_table.as_deref().unwrap_or(&self.source_table)
    }
}

/// A configured replacement for NULL fields of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnDefault {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Per-field normalization configuration.
///
/// NULL handling: a per-column entry in `column_defaults` wins; otherwise the
/// per-kind default applies. Setting a per-kind default to `null` in the
/// config forwards NULLs for that class of column unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Strip leading/trailing whitespace from text fields (default: true).
    #[serde(default = "default_true")]
    pub trim_text: bool,

    /// Replacement for NULL text fields (default: empty string).
    #[serde(default = "default_text_null")]
    pub text_null_default: Option<String>,

    /// Replacement for NULL integer fields (default: 0).
    #[serde(default = "default_integer_null")]
    pub integer_null_default: Option<i64>,

    /// Replacement for NULL float fields (default: 0.0).
    #[serde(default = "default_float_null")]
    pub float_null_default: Option<f64>,

    /// Per-column NULL replacements, overriding the per-kind defaults.
    #[serde(default)]
    pub column_defaults: HashMap<String, ColumnDefault>,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            trim_text: true,
            text_null_default: default_text_null(),
            integer_null_default: default_integer_null(),
            float_null_default: default_float_null(),
            column_defaults: HashMap::new(),
        }
    }
}

// Default value functions for serde

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_text_null() -> Option<String> {
    Some(String::new())
}

fn default_integer_null() -> Option<i64> {
    Some(0)
}

fn default_float_null() -> Option<f64> {
    Some(0.0)
}
