//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }

    // Migration validation
    if config.migration.source_table.is_empty() {
        return Err(MigrateError::Config(
            "migration.source_table is required".into(),
        ));
    }
    if config.migration.chunk_size == 0 {
        return Err(MigrateError::Config(
            "migration.chunk_size must be at least 1".into(),
        ));
    }

    // Cannot migrate a table onto itself
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
        && config.source.schema == config.target.schema
        && config.migration.source_table == config.migration.target_table()
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same table".into(),
        ));
    }

    Ok(())
}
