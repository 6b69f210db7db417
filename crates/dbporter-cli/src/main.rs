//! dbporter CLI - bulk table migration with checkpoint resume.

use clap::{Parser, Subcommand};
use dbporter::{CheckpointStore, Config, MigrationResult, Orchestrator, PortError, RunPlan};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "dbporter")]
#[command(about = "Bulk table migration from several source databases into MySQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to checkpoint file for resume capability
    #[arg(long)]
    checkpoint_file: Option<PathBuf>,

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
    /// Truncate and reload the planned tables
    Run {
        /// Reload every table, ignoring the checkpoint
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        refresh: bool,

        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override rows per destination append
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Retry only the tables missing from the last checkpoint
    Resume {
        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override rows per destination append
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show the run plan without connecting to any database
    Plan {
        /// Plan a full reload, ignoring the checkpoint
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        refresh: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, PortError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    if let Some(ref path) = cli.checkpoint_file {
        config.migration.checkpoint_file = Some(path.clone());
    }

    match cli.command {
        Commands::Run {
            refresh,
            workers,
            batch_size,
        } => {
            apply_overrides(&mut config, workers, batch_size)?;
            migrate(config, refresh, cli.output_json).await
        }

        Commands::Resume {
            workers,
            batch_size,
        } => {
            apply_overrides(&mut config, workers, batch_size)?;
            info!("Resuming from checkpoint");
            migrate(config, false, cli.output_json).await
        }

        Commands::Plan { refresh } => {
            let store = CheckpointStore::new(config.migration.checkpoint_path());
            let checkpoint = store.load();
            let plan = RunPlan::compute(&config.plan, checkpoint.as_ref(), refresh);

            if cli.output_json {
                println!("{}", plan.to_json()?);
            } else {
                println!("Run plan ({}):", plan.mode);
                println!("  Checkpoint: {}", store.path().display());
                println!("  Load: {}", join_or_none(&plan.work_list));
                println!("  Truncate: {}", join_or_none(&plan.truncation_targets));
                println!("  Skipped: {}", join_or_none(&plan.skipped));
                println!("  Scripts: {}", join_or_none(&config.plan.init_scripts));
            }
            Ok(0)
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                for endpoint in &result.endpoints {
                    println!(
                        "  {} {} ({}): {} ({}ms)",
                        endpoint.role,
                        endpoint.name,
                        endpoint.db_type,
                        if endpoint.healthy { "OK" } else { "FAILED" },
                        endpoint.latency_ms
                    );
                    if let Some(ref err) = endpoint.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(PortError::pool("health check failed", "health-check"));
            }
            Ok(0)
        }
    }
}

async fn migrate(config: Config, refresh: bool, output_json: bool) -> Result<u8, PortError> {
    let orchestrator = Orchestrator::new(config).await?;
    let result = orchestrator.run(refresh).await;
    orchestrator.close().await;
    let result = result?;

    if output_json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(&result);
    }
    Ok(result.outcome.exit_code())
}

fn apply_overrides(
    config: &mut Config,
    workers: Option<usize>,
    batch_size: Option<usize>,
) -> Result<(), PortError> {
    if let Some(w) = workers {
        config.migration.workers = w;
    }
    if let Some(b) = batch_size {
        config.migration.batch_size = b;
    }
    config.validate()
}

fn print_summary(result: &MigrationResult) {
    println!("\nMigration {} ({} run)", result.outcome, result.mode);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Tables: {}/{}", result.tables_success, result.tables_total);
    if !result.tables_skipped.is_empty() {
        println!("  Skipped (already loaded): {}", result.tables_skipped.join(", "));
    }
    println!("  Rows: {}", result.rows_transferred);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
    println!("  Scripts: {}", join_or_none(&result.scripts_executed));
    if let (Some(script), Some(err)) = (&result.failed_script, &result.script_error) {
        println!("  Failed script: {} ({})", script, err);
    }
    match &result.checkpoint_error {
        Some(err) => println!("  Checkpoint: NOT WRITTEN ({})", err),
        None => println!("  Checkpoint: {}", result.checkpoint_file.display()),
    }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
