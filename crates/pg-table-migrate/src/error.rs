//! Error types for the migration library.

use thiserror::Error;

/// Pipeline stage an error originated from, used for failure logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Extract,
    Transform,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection open or probe failure.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Chunk extraction failed against the source.
    #[error("Extraction failed for table {table}: {message}")]
    Extract { table: String, message: String },

    /// A record did not match the chunk's column set.
    #[error("Transform failed for table {table}: {message}")]
    Transform { table: String, message: String },

    /// Chunk load failed against the target.
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Extract error.
    pub fn extract(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Extract {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transform error.
    pub fn transform(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Transform {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Load error.
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Pipeline stage this error belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MigrateError::Connection { .. } => Some(Stage::Connect),
            MigrateError::Extract { .. } => Some(Stage::Extract),
            MigrateError::Transform { .. } => Some(Stage::Transform),
            MigrateError::Load { .. } => Some(Stage::Load),
            _ => None,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Connection { .. } => 2,
            MigrateError::Extract { .. } => 3,
            MigrateError::Transform { .. } => 4,
            MigrateError::Load { .. } => 5,
            MigrateError::Json(_) => 6,
            MigrateError::Io(_) => 7,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
