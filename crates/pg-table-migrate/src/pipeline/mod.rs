//! Migration pipeline - drives extract, transform, and load per chunk.
//!
//! A run moves through `Idle -> Running -> {Completed, Failed}`. Invocation
//! acquires both connections; the Running loop processes one chunk at a time
//! until the source returns an empty chunk (Completed) or a stage fails
//! (Failed). Both terminal states release both connections before the call
//! returns, and a failed run surfaces the originating error to the caller
//! after cleanup and logging.

mod log;

pub use log::{MigrationLog, TracingLog};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::connect::open_pool;
use crate::core::traits::{Cursor, Extract, Load};
use crate::error::{MigrateError, Result};
use crate::source::PgExtractor;
use crate::target::PgLoader;
use crate::transform::Transformer;

/// Opens and pairs the source and target connections for a run.
///
/// No retry logic lives here; a failed open is reported as-is. If the
/// target fails to open after the source succeeded, the source is closed
/// before the error propagates.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Open both sides for the configured tables.
    pub async fn open(config: &Config) -> Result<(PgExtractor, PgLoader)> {
        let source =
            PgExtractor::connect(&config.source, &config.migration.source_table).await?;

        match PgLoader::connect(&config.target, config.migration.target_table()).await {
            Ok(target) => Ok((source, target)),
            Err(e) => {
                source.close().await;
                Err(e)
            }
        }
    }
}

/// Result of a completed migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Source table (schema-qualified).
    pub source_table: String,

    /// Target table (schema-qualified).
    pub target_table: String,

    /// Chunks processed.
    pub chunks_processed: u64,

    /// Total records migrated.
    pub records_migrated: u64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row-count comparison between source and target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Per-side connection probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Transient per-run state: the cursor and the running counts.
///
/// Owned exclusively by the pipeline; nothing else mutates it.
struct MigrationRun {
    cursor: Cursor,
    chunks: u64,
    records: u64,
}

impl MigrationRun {
    fn new(cursor: Cursor) -> Self {
        Self {
            cursor,
            chunks: 0,
            records: 0,
        }
    }
}

/// Sequential chunked migration pipeline.
pub struct MigrationPipeline {
    config: Config,
    log: Arc<dyn MigrationLog>,
}

impl MigrationPipeline {
    /// Create a pipeline with the production `tracing` log sink.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            log: Arc::new(TracingLog),
        }
    }

    /// Substitute the logging capability (tests use a capturing one).
    pub fn with_log(mut self, log: Arc<dyn MigrationLog>) -> Self {
        self.log = log;
        self
    }

    /// Run the migration: acquire both connections, process chunks until
    /// the source is exhausted, release both connections.
    pub async fn run(&self) -> Result<MigrationResult> {
        let (source, target) = ConnectionManager::open(&self.config).await?;
        self.run_with(source, target).await
    }

    /// Run against already-opened stage implementations.
    ///
    /// Both sides are closed exactly once on every exit path, success or
    /// failure; any stage error is logged once with stage and cursor
    /// context and then returned to the caller.
    pub async fn run_with<E: Extract, L: Load>(
        &self,
        source: E,
        target: L,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let source_table = source.profile().full_name();
        let target_table = format!(
            "{}.{}",
            self.config.target.schema,
            self.config.migration.target_table()
        );

        self.log.info(&format!(
            "Migration {} started: {} -> {} (chunk size {})",
            run_id, source_table, target_table, self.config.migration.chunk_size
        ));

        let transformer = Transformer::new(self.config.transform.clone(), source_table.clone());
        let mut run = MigrationRun::new(source.profile().initial_cursor());

        let outcome = self.drive(&source, &target, &transformer, &mut run).await;

        // Scoped release: both connections, exactly once, on every path.
        source.close().await;
        target.close().await;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        match outcome {
            Ok(()) => {
                self.log.info(&format!(
                    "Migration {} completed: {} records in {} chunks ({:.2}s)",
                    run_id, run.records, run.chunks, duration
                ));
                Ok(MigrationResult {
                    run_id,
                    status: "completed".to_string(),
                    source_table,
                    target_table,
                    chunks_processed: run.chunks,
                    records_migrated: run.records,
                    started_at,
                    completed_at,
                    duration_seconds: duration,
                })
            }
            Err(e) => {
                let stage = e
                    .stage()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "pipeline".to_string());
                self.log.error(&format!(
                    "Migration {} failed at stage {} (cursor {}): {}",
                    run_id,
                    stage,
                    run.cursor.position(),
                    e
                ));
                Err(e)
            }
        }
    }

    /// The Running loop. Stage errors propagate to the single handler in
    /// `run_with`; `run.cursor` still names the failing chunk's position
    /// because the cursor only advances after a successful load.
    async fn drive<E: Extract, L: Load>(
        &self,
        source: &E,
        target: &L,
        transformer: &Transformer,
        run: &mut MigrationRun,
    ) -> Result<()> {
        let chunk_size = self.config.migration.chunk_size;

        loop {
            let chunk = source.next_chunk(&run.cursor, chunk_size).await?;
            if chunk.is_empty() {
                return Ok(());
            }
            if chunk.len() > chunk_size {
                return Err(MigrateError::extract(
                    source.profile().full_name(),
                    format!(
                        "chunk of {} records exceeds chunk size {}",
                        chunk.len(),
                        chunk_size
                    ),
                ));
            }

            // Transform preserves record count, so advancing from the raw
            // chunk keeps the cursor exact.
            let next_cursor = run.cursor.advanced(&chunk);

            let transformed = transformer.transform(chunk)?;
            let written = target.load_chunk(&transformed).await?;

            run.chunks += 1;
            run.records += written;
            run.cursor = next_cursor;

            self.log.info(&format!(
                "chunk {}: {} records (cursor {})",
                run.chunks,
                written,
                run.cursor.position()
            ));
        }
    }

    /// Compare source and target row counts.
    pub async fn validate(&self) -> Result<ValidationResult> {
        let (source, target) = ConnectionManager::open(&self.config).await?;

        let counts = async {
            let source_rows = source.row_count().await?;
            let target_rows = target.row_count().await?;
            Ok::<_, MigrateError>((source_rows, target_rows))
        }
        .await;

        source.close().await;
        target.close().await;

        let (source_rows, target_rows) = counts?;
        let matches = source_rows == target_rows;

        if matches {
            self.log
                .info(&format!("Validation: {} rows (match)", source_rows));
        } else {
            self.log.error(&format!(
                "Validation: source={} target={} (MISMATCH)",
                source_rows, target_rows
            ));
        }

        Ok(ValidationResult {
            source_rows,
            target_rows,
            matches,
        })
    }

    /// Probe both connections without touching table data.
    pub async fn health_check(&self) -> HealthCheckResult {
        let (source_connected, source_latency_ms, source_error) =
            probe(&self.config.source, "source").await;
        let (target_connected, target_latency_ms, target_error) =
            probe(&self.config.target, "target").await;

        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        }
    }
}

async fn probe(config: &crate::config::DbConfig, context: &str) -> (bool, u64, Option<String>) {
    let start = Instant::now();
    match open_pool(config, context).await {
        Ok(pool) => {
            pool.close();
            (true, start.elapsed().as_millis() as u64, None)
        }
        Err(e) => (false, start.elapsed().as_millis() as u64, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::config::{DbConfig, MigrationSettings, TransformSettings};
    use crate::core::traits::{ColumnInfo, TableProfile};
    use crate::core::value::{Chunk, Value, ValueKind};
    use crate::error::Stage;

    fn test_config(chunk_size: usize) -> Config {
        Config {
            source: DbConfig {
                host: "src".into(),
                port: 5432,
                database: "shop".into(),
                user: "reader".into(),
                password: "pw".into(),
                schema: "public".into(),
                ssl_mode: "disable".into(),
            },
            target: DbConfig {
                host: "dst".into(),
                port: 5432,
                database: "warehouse".into(),
                user: "writer".into(),
                password: "pw".into(),
                schema: "public".into(),
                ssl_mode: "disable".into(),
            },
            migration: MigrationSettings {
                source_table: "customers".into(),
                target_table: None,
                chunk_size,
            },
            transform: TransformSettings::default(),
        }
    }

    fn keyed_profile() -> TableProfile {
        TableProfile {
            schema: "public".into(),
            table: "customers".into(),
            columns: vec![
                ColumnInfo {
                    name: "id".into(),
                    data_type: "int8".into(),
                    kind: ValueKind::Integer,
                },
                ColumnInfo {
                    name: "name".into(),
                    data_type: "text".into(),
                    kind: ValueKind::Text,
                },
            ],
            key_column: Some("id".into()),
        }
    }

    fn offset_profile() -> TableProfile {
        TableProfile {
            key_column: None,
            ..keyed_profile()
        }
    }

    /// Source that serves a fixed set of keyed rows, honoring the cursor
    /// the way the real extractor does.
    struct ScriptedSource {
        profile: TableProfile,
        total_rows: i64,
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
        cursors_seen: Mutex<Vec<Cursor>>,
        closes: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(profile: TableProfile, total_rows: i64) -> Self {
            Self {
                profile,
                total_rows,
                fail_on_call: None,
                calls: AtomicUsize::new(0),
                cursors_seen: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, call: usize) -> Self {
            self.fail_on_call = Some(call);
            self
        }

        fn row(id: i64) -> Vec<Value> {
            vec![Value::Integer(id), Value::Text(format!("  name-{} ", id))]
        }
    }

    #[async_trait]
    impl Extract for ScriptedSource {
        fn profile(&self) -> &TableProfile {
            &self.profile
        }

        async fn next_chunk(&self, cursor: &Cursor, chunk_size: usize) -> crate::error::Result<Chunk> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.cursors_seen.lock().unwrap().push(*cursor);

            if self.fail_on_call == Some(call) {
                return Err(MigrateError::extract("public.customers", "query failed"));
            }

            let start = match cursor {
                Cursor::Keyset { last_pk } => last_pk.unwrap_or(0),
                Cursor::Offset { rows_read } => *rows_read,
            };
            let end = (start + chunk_size as i64).min(self.total_rows);
            let rows: Vec<_> = ((start + 1)..=end).map(Self::row).collect();
            let last_key = match cursor {
                Cursor::Keyset { .. } if !rows.is_empty() => Some(end),
                _ => None,
            };

            Ok(Chunk::new(self.profile.column_names(), rows).with_last_key(last_key))
        }

        async fn row_count(&self) -> crate::error::Result<i64> {
            Ok(self.total_rows)
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Sink that records committed chunks, with optional injected failure.
    struct RecordingSink {
        committed: Mutex<Vec<Chunk>>,
        load_attempts: AtomicUsize,
        fail_on_chunk: Option<usize>,
        closes: AtomicUsize,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                committed: Mutex::new(Vec::new()),
                load_attempts: AtomicUsize::new(0),
                fail_on_chunk: None,
                closes: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, chunk: usize) -> Self {
            self.fail_on_chunk = Some(chunk);
            self
        }
    }

    #[async_trait]
    impl Load for RecordingSink {
        async fn load_chunk(&self, chunk: &Chunk) -> crate::error::Result<u64> {
            let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_chunk == Some(attempt) {
                return Err(MigrateError::load("public.customers", "constraint violation"));
            }
            self.committed.lock().unwrap().push(chunk.clone());
            Ok(chunk.len() as u64)
        }

        async fn row_count(&self) -> crate::error::Result<i64> {
            let committed = self.committed.lock().unwrap();
            Ok(committed.iter().map(|c| c.len() as i64).sum())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Capturing log for asserting on pipeline output.
    #[derive(Default)]
    struct CaptureLog {
        info_lines: Mutex<Vec<String>>,
        error_lines: Mutex<Vec<String>>,
    }

    impl MigrationLog for CaptureLog {
        fn info(&self, message: &str) {
            self.info_lines.lock().unwrap().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.error_lines.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn test_completeness_2500_rows_chunk_1000() {
        let source = ScriptedSource::new(keyed_profile(), 2500);
        let sink = RecordingSink::new();
        let log = Arc::new(CaptureLog::default());
        let pipeline =
            MigrationPipeline::new(test_config(1000)).with_log(log.clone());

        let result = pipeline.run_with(source, sink).await.unwrap();

        assert_eq!(result.status, "completed");
        assert_eq!(result.records_migrated, 2500);
        assert_eq!(result.chunks_processed, 3);

        // 3 progress lines, plus the start line and the completion line.
        let info = log.info_lines.lock().unwrap();
        let progress: Vec<_> = info.iter().filter(|l| l.starts_with("chunk ")).collect();
        assert_eq!(progress.len(), 3);
        assert!(info.last().unwrap().contains("2500 records"));
        assert!(log.error_lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_every_record_arrives_exactly_once() {
        let source = ScriptedSource::new(keyed_profile(), 2500);
        let sink = RecordingSink::new();
        let pipeline = MigrationPipeline::new(test_config(1000));

        // Keep shared handles for post-run assertions.
        let source = Arc::new(source);
        let sink = Arc::new(sink);
        pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap();

        // ceil(2500/1000) = 3 non-empty reads plus one empty terminating read.
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);

        let committed = sink.committed.lock().unwrap();
        assert_eq!(
            committed.iter().map(|c| c.len()).collect::<Vec<_>>(),
            vec![1000, 1000, 500]
        );

        let mut ids = HashSet::new();
        for chunk in committed.iter() {
            for row in &chunk.rows {
                match &row[0] {
                    Value::Integer(id) => assert!(ids.insert(*id), "duplicate id {}", id),
                    other => panic!("unexpected id value {:?}", other),
                }
            }
        }
        assert_eq!(ids.len(), 2500);
        assert_eq!(ids.iter().min(), Some(&1));
        assert_eq!(ids.iter().max(), Some(&2500));
    }

    #[tokio::test]
    async fn test_records_are_transformed_before_load() {
        let source = Arc::new(ScriptedSource::new(keyed_profile(), 10));
        let sink = Arc::new(RecordingSink::new());
        let pipeline = MigrationPipeline::new(test_config(1000));

        pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap();

        let committed = sink.committed.lock().unwrap();
        for row in &committed[0].rows {
            match &row[1] {
                Value::Text(s) => assert_eq!(s, s.trim(), "untrimmed value reached the sink"),
                other => panic!("unexpected value {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_offset_cursor_advances_exactly_by_chunk_len() {
        let source = Arc::new(ScriptedSource::new(offset_profile(), 2500));
        let sink = Arc::new(RecordingSink::new());
        let pipeline = MigrationPipeline::new(test_config(1000));

        pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap();

        let cursors = source.cursors_seen.lock().unwrap();
        assert_eq!(
            *cursors,
            vec![
                Cursor::Offset { rows_read: 0 },
                Cursor::Offset { rows_read: 1000 },
                Cursor::Offset { rows_read: 2000 },
                Cursor::Offset { rows_read: 2500 },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_source_completes_with_zero_records() {
        let source = Arc::new(ScriptedSource::new(keyed_profile(), 0));
        let sink = Arc::new(RecordingSink::new());
        let log = Arc::new(CaptureLog::default());
        let pipeline =
            MigrationPipeline::new(test_config(1000)).with_log(log.clone());

        let result = pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap();

        assert_eq!(result.records_migrated, 0);
        assert_eq!(result.chunks_processed, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(sink.committed.lock().unwrap().is_empty());

        let info = log.info_lines.lock().unwrap();
        assert!(!info.iter().any(|l| l.starts_with("chunk ")));
    }

    #[tokio::test]
    async fn test_load_failure_stops_run_and_keeps_prior_chunks() {
        let source = Arc::new(ScriptedSource::new(keyed_profile(), 2500));
        let sink = Arc::new(RecordingSink::new().failing_on(2));
        let log = Arc::new(CaptureLog::default());
        let pipeline =
            MigrationPipeline::new(test_config(1000)).with_log(log.clone());

        let err = pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Load));

        // Chunk 1 stays committed; nothing after chunk 2 was attempted.
        assert_eq!(sink.committed.lock().unwrap().len(), 1);
        assert_eq!(sink.load_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // The failure line names the stage and the failing chunk's cursor.
        let errors = log.error_lines.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("stage load"));
        assert!(errors[0].contains("key>1000"));
    }

    #[tokio::test]
    async fn test_extract_failure_closes_both_connections() {
        let source = Arc::new(ScriptedSource::new(keyed_profile(), 2500).failing_on(1));
        let sink = Arc::new(RecordingSink::new());
        let pipeline = MigrationPipeline::new(test_config(1000));

        let err = pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Extract));
        assert_eq!(source.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_closes_both_connections() {
        // A source that emits a malformed record (wrong field count).
        struct MalformedSource {
            inner: ScriptedSource,
        }

        #[async_trait]
        impl Extract for MalformedSource {
            fn profile(&self) -> &TableProfile {
                self.inner.profile()
            }

            async fn next_chunk(
                &self,
                _cursor: &Cursor,
                _chunk_size: usize,
            ) -> crate::error::Result<Chunk> {
                Ok(Chunk::new(
                    self.inner.profile.column_names(),
                    vec![vec![Value::Integer(1)]],
                ))
            }

            async fn row_count(&self) -> crate::error::Result<i64> {
                Ok(1)
            }

            async fn close(&self) {
                self.inner.close().await;
            }
        }

        let source = Arc::new(MalformedSource {
            inner: ScriptedSource::new(keyed_profile(), 1),
        });
        let sink = Arc::new(RecordingSink::new());
        let pipeline = MigrationPipeline::new(test_config(1000));

        let err = pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Transform));
        assert!(sink.committed.lock().unwrap().is_empty());
        assert_eq!(source.inner.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_failure_closes_both_connections() {
        let source = Arc::new(ScriptedSource::new(keyed_profile(), 100));
        let sink = Arc::new(RecordingSink::new().failing_on(1));
        let pipeline = MigrationPipeline::new(test_config(50));

        pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap_err();

        assert_eq!(source.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_closes_both_connections_once() {
        let source = Arc::new(ScriptedSource::new(keyed_profile(), 10));
        let sink = Arc::new(RecordingSink::new());
        let pipeline = MigrationPipeline::new(test_config(1000));

        pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap();

        assert_eq!(source.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_chunk_is_rejected() {
        struct OversizedSource {
            inner: ScriptedSource,
        }

        #[async_trait]
        impl Extract for OversizedSource {
            fn profile(&self) -> &TableProfile {
                self.inner.profile()
            }

            async fn next_chunk(
                &self,
                cursor: &Cursor,
                _chunk_size: usize,
            ) -> crate::error::Result<Chunk> {
                // Ignores the requested bound.
                self.inner.next_chunk(cursor, 5000).await
            }

            async fn row_count(&self) -> crate::error::Result<i64> {
                self.inner.row_count().await
            }

            async fn close(&self) {
                self.inner.close().await;
            }
        }

        let source = Arc::new(OversizedSource {
            inner: ScriptedSource::new(keyed_profile(), 2500),
        });
        let sink = Arc::new(RecordingSink::new());
        let pipeline = MigrationPipeline::new(test_config(1000));

        let err = pipeline
            .run_with(source.clone(), sink.clone())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Extract));
        assert!(sink.committed.lock().unwrap().is_empty());
        assert_eq!(source.inner.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }
}
