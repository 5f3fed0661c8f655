//! pg-table-migrate CLI - chunked PostgreSQL table-to-table migration.

use clap::{Parser, Subcommand};
use pg_table_migrate::{Config, MigrateError, MigrationPipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "pg-table-migrate")]
#[command(about = "Chunked PostgreSQL table-to-table migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Override source table
        #[arg(long)]
        source_table: Option<String>,

        /// Override target table
        #[arg(long)]
        target_table: Option<String>,

        /// Override records per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Compare source and target row counts
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            source_table,
            target_table,
            chunk_size,
        } => {
            // Apply overrides, then re-check the result.
            if let Some(table) = source_table {
                config.migration.source_table = table;
            }
            if let Some(table) = target_table {
                config.migration.target_table = Some(table);
            }
            if let Some(size) = chunk_size {
                config.migration.chunk_size = size;
            }
            config.validate()?;

            let pipeline = MigrationPipeline::new(config);
            let result = pipeline.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Table: {} -> {}", result.source_table, result.target_table);
                println!("  Chunks: {}", result.chunks_processed);
                println!("  Records: {}", result.records_migrated);
                println!("  Duration: {:.2}s", result.duration_seconds);
            }
        }

        Commands::Validate => {
            let pipeline = MigrationPipeline::new(config);
            let result = pipeline.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Validation Results:");
                println!("  Source rows: {}", result.source_rows);
                println!("  Target rows: {}", result.target_rows);
                println!(
                    "  Status: {}",
                    if result.matches { "match" } else { "MISMATCH" }
                );
            }

            if !result.matches {
                return Err(MigrateError::load(
                    "validate",
                    "row counts do not match between source and target",
                ));
            }
        }

        Commands::HealthCheck => {
            let pipeline = MigrationPipeline::new(config);
            let result = pipeline.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target: {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check failed",
                    "one or both databases are unreachable",
                ));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
