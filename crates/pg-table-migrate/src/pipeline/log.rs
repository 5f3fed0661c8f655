//! Injected logging capability for the pipeline.
//!
//! The pipeline reports progress and failures through this trait rather
//! than a module-global logger, so tests can substitute a capturing
//! implementation. The production implementation forwards to `tracing`.

use tracing::{error, info};

/// Logging operations the pipeline needs.
pub trait MigrationLog: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards pipeline log lines to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingLog;

impl MigrationLog for TracingLog {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}
