//! dbferry CLI - migrate schemas and data between SQL Server and PostgreSQL.

use clap::{Parser, Subcommand};
use dbferry::{
    Config, FailureManifest, MigrateError, MigrationReport, Orchestrator, Progress, ProgressEvent,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dbferry")]
#[command(about = "Migrate schemas and data between SQL Server and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Output the final report as JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run,

    /// Test connectivity to both endpoints
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::HealthCheck => {
            dbferry::health_check(&config).await?;
            println!("Both endpoints reachable.");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            let mut orchestrator = Orchestrator::new(config);
            if cli.progress {
                orchestrator = orchestrator.with_progress(Arc::new(JsonProgress));
            }

            let report = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_summary(&report);
                if !report.is_success() {
                    render_failures(&report.failures);
                }
            }

            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
    }
}

/// Emits every progress event as one JSON object per line on stderr, for
/// machine consumers wrapping the CLI.
struct JsonProgress;

impl Progress for JsonProgress {
    fn on_event(&self, event: &ProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", line);
        }
    }
}

fn print_summary(report: &MigrationReport) {
    println!(
        "Migrated {}/{} tables ({} rows) in {:.1}s",
        report.tables_migrated,
        report.tables_total,
        report.rows_transferred,
        report.duration_seconds
    );
}

/// Render the failure manifest as a plain text table on stderr.
fn render_failures(failures: &FailureManifest) {
    let schema_width = failures
        .into_iter()
        .map(|f| f.schema.len())
        .chain(["SCHEMA".len()])
        .max()
        .unwrap_or(0);
    let table_width = failures
        .into_iter()
        .map(|f| f.table.len())
        .chain(["TABLE".len()])
        .max()
        .unwrap_or(0);

    eprintln!();
    eprintln!("Failed migrations:");
    eprintln!(
        "  {:<sw$}  {:<tw$}  REASON",
        "SCHEMA",
        "TABLE",
        sw = schema_width,
        tw = table_width
    );
    for failed in failures {
        eprintln!(
            "  {:<sw$}  {:<tw$}  {}",
            failed.schema,
            failed.table,
            failed.reason,
            sw = schema_width,
            tw = table_width
        );
    }
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
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
